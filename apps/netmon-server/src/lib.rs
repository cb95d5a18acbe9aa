// [apps/netmon-server/src/lib.rs]
//! Library root for the Netmon daemon binary. The composition root lives
//! in `kernel`; `main.rs` only loads configuration, initializes tracing,
//! and ignites the kernel.

pub mod kernel;

pub mod prelude {
    pub use crate::kernel::NetmonKernel;
}
