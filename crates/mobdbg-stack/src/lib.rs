//! mobdbg-stack: decoding of debuggee stack dumps and values.
//!
//! Payloads are literal Lua data. They are parsed by a dedicated
//! recursive-descent reader (nothing is executed) and then classified into
//! a closed set of value kinds, including the game engine's vector, hash
//! and url types.

pub mod error;
pub mod literal;
pub mod patterns;
pub mod stack;
pub mod value;
pub mod variable;

pub use error::DecodeError;
pub use literal::{parse_literal, LuaTable, LuaValue, TableKey};
pub use stack::{decode_stack, decode_values, try_decode_stack, CoroutineStackInfo, FrameInfo, StackDump};
pub use value::{classify, format_number, ValueKind, VectorKind};
pub use variable::{group_varargs, Role, Variable};
