//! Method bodies and member flag sets.
//!
//! [`MethodBody`] reads tiny and fat body headers as they appear at a `MethodDef` RVA and
//! encodes replacement bodies. Only the header is modelled; the code itself is decoded by
//! [`crate::assembly`].

mod body;
mod types;

pub use body::MethodBody;
pub use types::*;
