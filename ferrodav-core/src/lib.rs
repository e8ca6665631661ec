mod entry;
mod error;
mod paths;
mod pipeline;
mod property;
mod store;
mod target;

pub use entry::{
    CollectionNode, CollectionSource, Depth, DepthParseError, DocumentSource, SourceRemover,
};
pub use error::BackendError;
pub use paths::{PathError, join_url, normalize_url};
pub use pipeline::EntryProperties;
pub use property::{DAV_NAMESPACE, Property, PropertyName};
pub use store::PropertyStore;
pub use target::{CollectionHandle, CollectionTarget, DocumentTarget, MissingTarget, Target};
