// HTTP and SSE collaborators for the Weft engine
//
// Implements the weft-core trait seams over reqwest: HttpSessionApi for the
// snapshot/CRUD surface and SseConnector for the live push stream.

pub mod client;
pub mod stream;

pub use client::{ApiError, HttpSessionApi};
pub use stream::{ConnectionStatus, SseConnector};
