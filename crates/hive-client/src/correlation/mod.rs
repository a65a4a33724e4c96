//! Request/response correlation over a shared connection.

pub mod correlator;
pub mod envelope;
pub mod policy;
pub mod registry;

pub use correlator::RequestCorrelator;
pub use envelope::ResponseEnvelope;
pub use policy::{Extract, ExtractionPolicy, FieldPolicy};
pub use registry::{PendingSlot, ResolveOutcome, ResponseRegistry};
