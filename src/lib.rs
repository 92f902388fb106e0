// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # ciltac
//!
//! Translation of CIL (Common Intermediate Language) method bodies into a typed three-address
//! code (TAC) for static analysis.
//!
//! CIL is a stack machine: operands travel through an evaluation stack that is invisible in
//! the instruction stream. `ciltac` makes that data flow explicit. Every value-producing
//! instruction becomes one assignment to a typed temporary, control flow becomes numbered
//! `goto`/`if` statements, and exception handling constructs are lowered so that `finally`
//! handlers run inline on every normal exit.
//!
//! ## Pipeline
//!
//! 1. [`assembly::decode_method`] decodes the code bytes into an instruction arena with
//!    resolved branch targets and metadata operands.
//! 2. [`assembly::import_clauses`] anchors the exception clause table on decoded instructions.
//! 3. [`analysis::cfg::ControlFlowGraph`] partitions the instructions into basic blocks whose
//!    boundaries respect both branches and exception regions.
//! 4. The translator replays every block against an abstract operand stack, introducing merge
//!    placeholders where control flow paths disagree about a stack slot.
//! 5. [`analysis::tac::inline_finally`] duplicates `finally` handlers at the exits crossing
//!    them and turns `leave` into `goto`.
//!
//! [`analysis::tac::translate_method`] runs all stages for one method,
//! [`analysis::translate_methods`] for a batch, isolating failures per method.
//!
//! ## Quick Start
//!
//! ```rust
//! use ciltac::prelude::*;
//!
//! // ldarg.0; ldc.i4.2; mul; ret
//! let method = MethodDescriptor::new("Double", Token::new(0x0600_0001))
//!     .with_params(vec![TacType::I32])
//!     .with_return(TacType::I32)
//!     .with_code(vec![0x02, 0x18, 0x5A, 0x2A]);
//!
//! let tac = translate_method(
//!     &method,
//!     &MemoryResolver::new(),
//!     &TypeHierarchy::new(),
//!     &TranslationConfig::default(),
//! )?;
//! println!("{tac}");
//! assert_eq!(tac.statements[0].to_string(), "t1 = arg0 * 2");
//! # Ok::<(), ciltac::Error>(())
//! ```
//!
//! ## Collaborators
//!
//! Metadata lives outside this crate. Tokens are resolved through the
//! [`metadata::resolver::MemberResolver`] trait, and merge placeholders are typed through
//! [`metadata::typesystem::TypeJoin`]. [`metadata::resolver::MemoryResolver`] and
//! [`metadata::typesystem::TypeHierarchy`] are in-memory implementations suitable for tests
//! and for drivers that already hold the metadata.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Every error except
//! [`Error::UnresolvedMember`] is fatal for the method being translated and never for a batch:
//!
//! ```rust
//! use ciltac::{prelude::*, Error};
//!
//! // add on an empty stack
//! let method = MethodDescriptor::new("Broken", Token::new(0x0600_0001)).with_code(vec![0x58, 0x2A]);
//! let result = translate_method(
//!     &method,
//!     &MemoryResolver::new(),
//!     &TypeHierarchy::new(),
//!     &TranslationConfig::default(),
//! );
//! assert!(matches!(result, Err(Error::StackUnderflow { offset: 0 })));
//! ```
//!
//! ## Development and Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! cargo +nightly fuzz run translate --release
//! ```

#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use ciltac::prelude::*;
///
/// let config = TranslationConfig::minimal();
/// assert!(!config.parallel);
/// ```
pub mod prelude;

/// Instruction decoding and exception region import.
///
/// This module turns raw CIL code bytes into an arena of instruction nodes:
///
/// - [`assembly::Opcode`] - The ECMA-335 opcode table
/// - [`assembly::decode_method`] - Decode a method's code bytes with resolved operands
/// - [`assembly::import_clauses`] - Anchor exception clauses on decoded instructions
/// - [`assembly::InstructionEncoder`] - Assemble code bytes from mnemonics and labels
pub mod assembly;

/// Control flow graphs and three-address code.
pub mod analysis;

/// Contracts with the metadata layer.
///
/// Tokens, the type model of the translator, resolved member shapes, method bodies and the
/// resolver and type join traits through which the pipeline consults metadata.
pub mod metadata;

/// `ciltac` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `ciltac` Error type
///
/// The main error type for all operations in this crate. See [`Error::is_fatal_for_method`]
/// for the propagation policy.
pub use error::Error;

/// Bounds-checked cursor over raw bytes.
///
/// # Example
///
/// ```rust
/// use ciltac::Parser;
///
/// let code = [0x2A, 0x01, 0x00];
/// let mut parser = Parser::new(&code);
/// assert_eq!(parser.read_le::<u8>()?, 0x2A);
/// assert_eq!(parser.read_le::<u16>()?, 1);
/// # Ok::<(), ciltac::Error>(())
/// ```
pub use file::parser::Parser;
