pub mod emissions;
pub mod lookup;
