//! Wire types for the `stencil.v1.WorkflowTemplateService` API.

mod util;

pub mod v1 {
    tonic::include_proto!("stencil.v1");
}

pub use util::*;
