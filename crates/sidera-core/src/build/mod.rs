pub mod buffers;
pub mod channels;
pub mod coordinator;
pub(crate) mod worker;

pub use buffers::{live_buffer_sets, BufferSnapshot, BufferView, CubeShape, SharedBufferSet};
pub use channels::{OrderAck, ResultMessage, WorkItem, WorkMessage, WorkerFailure};
pub use coordinator::TemplateBuilder;
