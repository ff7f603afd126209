pub mod fields;
pub mod finalize;
pub mod normalize;
pub mod record;
pub mod salary;
pub mod strategy;
