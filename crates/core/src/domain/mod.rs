pub mod category;
pub mod message;
pub mod state;
