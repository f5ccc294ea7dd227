pub mod args;
pub mod body;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod exception;
pub mod handler;
pub mod handlers;
pub mod memory;
pub mod multipart;
pub mod param;
pub mod properties;
pub mod range;
pub mod request;
pub mod resource;
pub mod response;
pub mod state;
pub mod template;
pub mod util;

pub use args::Arguments;
pub use cache::HandlerCache;
pub use config::Config;
pub use dispatch::Engine;
pub use exception::Exception;
pub use handler::{HandlerOutput, HandlerRegistry, HandlerUnit};
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use properties::{PropValue, Properties};
pub use request::RequestContext;
pub use response::Response;
pub use util::HtmlBuilder;
