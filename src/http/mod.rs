pub mod ordered_map;
pub mod request;
pub mod response;

pub use ordered_map::OrderedMap;
pub use request::{HttpRequest, Method};
pub use response::{HttpResponse, StatusCode};
