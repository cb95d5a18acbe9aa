// [libs/netmon-writer/src/lib.rs]
//! Result Writer (plugin output → typed samples) and Batch Writer
//! (typed samples → bulk-inserted storage rows).

mod batch_writer;
mod result_writer;

pub use batch_writer::{spawn, BatchWriterConfig, BatchWriterHandle};
pub use result_writer::parse_plugin_result;
