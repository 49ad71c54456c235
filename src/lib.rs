//! Lifts a Windows kernel driver binary into a portable stack-machine
//! ("Forth"-style) source module describing its hardware-facing behavior.
//!
//! The pipeline runs in five stages, each its own module, in dependency
//! order:
//!
//! 1. [`pe`] — parses the PE/COFF container (headers, sections, imports,
//!    exports) and resolves RVAs to file offsets.
//! 2. [`decoder`] — decodes x86-32/64 machine code into a flat instruction
//!    stream.
//! 3. [`uir`] — lifts the instruction stream into basic blocks with a
//!    control-flow graph (the "Universal IR").
//! 4. [`semantic`] — classifies each function as hardware-relevant or
//!    Windows scaffolding, using the import table and the UIR's port-I/O
//!    summary.
//! 5. [`codegen`] — emits a Forth vocabulary source file for the functions
//!    worth keeping.
//!
//! Stages 2 through 5 are pure transformations over in-memory data; the
//! crate never touches a filesystem or prints anything on its own.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod codegen;
pub mod container;
pub mod decoder;
pub mod error;
pub mod options;
#[cfg(feature = "pe32")]
pub mod pe;
#[cfg(feature = "pe32")]
pub mod pipeline;
pub mod semantic;
pub mod uir;
