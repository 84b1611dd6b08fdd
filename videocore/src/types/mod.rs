pub mod call;
pub mod captions;
pub mod events;
