//! Carto Territory - territory expression algebra
//!
//! Converts between the two forms a map territory takes:
//! - the builder form, an ordered list of `{op, type, value}` parts
//!   ([`ExpressionTree`])
//! - the code form, a Python expression such as
//!   `gadm("IND") | (KURU - polygon([[28.6, 77.2], [19.0, 72.8], [13.0, 80.2]]))`
//!
//! Code is only ever parsed, never evaluated. Anything outside the territory
//! grammar is rejected with the offending fragment.
//!
//! # Example
//!
//! ```rust,ignore
//! use carto_territory::{parse_expression, serialize_expression};
//!
//! let parsed = parse_expression(r#"gadm("IND") - indic.KURU"#)?;
//! let builder = parsed.tree.to_builder_json();
//! let code = serialize_expression(&parsed.tree)?;
//! assert_eq!(code, r#"gadm("IND") - indic.KURU"#);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod builder;
pub mod catalog;
pub mod error;
mod literal;
pub mod model;
pub mod parser;
pub mod serializer;
pub mod sync;
mod syntax;

// Re-exports for convenience
pub use catalog::{TerritoryCatalog, TERRITORY_INDEX};
pub use error::{ExpressionError, ExpressionResult};
pub use model::{canonical_polygon, parse_polygon, ExpressionTree, Operand, OperandKind, Part, SetOp};
pub use parser::{parse_expression, ParseWarning, ParsedExpression, ParserConfig, TreeParser, DEFAULT_MAX_DEPTH};
pub use serializer::{serialize_expression, TreeSerializer};
pub use sync::{code_to_document, document_to_code, Layer, MapDocument, MapSync, SyncWarning, SyncedDocument};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with territory expressions
    pub use crate::{
        ExpressionError, ExpressionTree, Operand, Part, SetOp, TerritoryCatalog, TreeParser,
        TreeSerializer,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
