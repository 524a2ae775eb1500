pub extern crate euclid;

mod bytes;
pub mod document;
pub mod errors;
pub mod filters;
pub mod fonts;
pub mod forms;
pub mod geom;
pub mod info;
pub mod object;
mod parser;
mod serializer;

pub use document::{Document, PageResources};
pub use errors::{PdfError, PdfResult};
pub use forms::{FieldKind, FieldValue, Form};
pub use info::DocumentInfo;
pub use object::registry::Registry;
pub use object::{Dictionary, Name, Object, ObjectId, PdfString, Stream};
pub use serializer::{save_full, save_incremental, SaveOptions};
