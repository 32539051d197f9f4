// ViewerContext middleware and extractor
// Handlers only ever see the ViewerContext, never the raw Authorization header.

pub mod viewer_context_extractor;
pub mod viewer_context_middleware;

pub use viewer_context_extractor::Vc;
pub use viewer_context_middleware::*;
