pub mod preview;
pub mod worker;
