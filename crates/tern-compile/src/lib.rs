//! tern-compile - Templating seam for Tern
//!
//! The scheduler compiles nodes through the [`Renderer`] trait; the real
//! templating engine is an external collaborator. The built-in
//! [`RelationRenderer`] resolves `ref`/`source` placeholders against the
//! manifest and inlines ephemeral dependencies as common-table-expressions.

pub mod error;
pub mod inline;
pub mod renderer;

pub use error::{CompileError, CompileResult};
pub use inline::{cte_name, inline_ephemeral_ctes};
pub use renderer::{source_relation_name, RelationRenderer, Renderer};
