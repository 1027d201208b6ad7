#![allow(clippy::match_like_matches_macro)]

//! [`shade_compose`] - composable GLSL shader templates
//!
//! GLSL functions are written as templates containing `$placeholder` markers.
//! Templates are wired together by binding [`Function`]s, [`Variable`]s and
//! verbatim expressions to those placeholders. The resulting object graph is
//! tracked for changes and turned into collision-free GLSL source per shader
//! stage by the [`Compiler`]. [`ModularProgram`] ties compiled source and
//! variable values to an external GPU program object.

#[macro_use]
mod common;

mod error;
pub use error::*;

mod value;
pub use value::*;

pub mod parsing;

mod object;
pub use object::*;

mod variable;
pub use variable::*;

mod expression;
pub use expression::*;

mod function;
pub use function::*;

mod chain;
pub use chain::*;

mod statements;
pub use statements::*;

mod settings;
pub use settings::*;

mod glsl_words;

mod compiler;
pub use compiler::*;

mod program;
pub use program::*;

pub mod prettify;
