//! Response correlation: collectors and the listener that feeds them.

mod collector;
mod listener;
mod response;

pub use collector::{
    MultiResponseCollector, ResponseCollector, ResponseParts, SingleResponse,
    SingleResponseCollector,
};
pub use listener::ResponseListener;
pub use response::{Response, ResponseType};
