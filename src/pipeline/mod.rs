//! Pipeline components: channels, producer/consumer wrappers, mediator, run context.

pub mod context;
pub mod mediator;
pub mod memory;
pub mod producer;
pub mod queue;
pub mod serialized;

pub use context::{PipelineTuning, RunChannels};
pub use mediator::Mediator;
pub use memory::MemoryQueue;
pub use producer::{Consumer, DrainStatus, Producer};
pub use queue::{Abortable, Channel, QueueError, QueueReader, QueueWriter, Received};
pub use serialized::{Frame, FrameReader, FrameWriter};
