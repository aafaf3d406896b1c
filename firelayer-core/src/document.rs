//! Record types, identifier kinds and the mapping capability between raw store data
//! and typed payloads.
//!
//! A document is addressed by a [`DocumentRef`]: a slash separated collection path plus a
//! store-local id. The store hands back [`RawRecord`]s which a [`Mapper`] turns into
//! typed [`Record`]s.
//!
//! # Example
//!
//! ```ignore
//! use firelayer::document::{GroupDocument, Record};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
//! pub struct Post {
//!     #[serde(rename = "__id")]
//!     pub key: String,
//!     pub title: String,
//! }
//!
//! impl GroupDocument for Post {
//!     const GROUP_NAME: &'static str = "posts";
//!     const UNIQUE_KEY_FIELD: &'static str = "__id";
//! }
//! ```

use bson::{Bson, de::deserialize_from_document, ser::serialize_to_document};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{fmt, marker::PhantomData};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// The native identifier of a document inside one collection.
///
/// Store-local ids are only unique within their parent collection, so two documents in
/// sibling sub-collections may share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreLocalId(String);

/// An application-level identifier, unique across every collection of a collection group.
///
/// The value lives in a payload field declared by [`GroupDocument::UNIQUE_KEY_FIELD`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlobalUniqueKey(String);

macro_rules! string_identifier {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&String> for $name {
            fn from(value: &String) -> Self {
                Self(value.clone())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_identifier!(StoreLocalId);
string_identifier!(GlobalUniqueKey);

/// Location of a single document: the path of its collection plus its store-local id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    collection: String,
    id: StoreLocalId,
}

impl DocumentRef {
    pub fn new(collection: impl Into<String>, id: impl Into<StoreLocalId>) -> Self {
        Self { collection: collection.into(), id: id.into() }
    }

    /// Returns the store-local id of the document.
    pub fn id(&self) -> &StoreLocalId {
        &self.id
    }

    /// Returns the path of the collection holding the document, e.g. `users/u1/posts`.
    pub fn collection_path(&self) -> &str {
        &self.collection
    }

    /// Returns the last segment of the collection path, i.e. the collection group name.
    pub fn collection_name(&self) -> &str {
        self.collection
            .rsplit('/')
            .next()
            .unwrap_or(&self.collection)
    }

    /// Returns the full path of the document, e.g. `users/u1/posts/p1`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.collection, self.id)
    }

    /// Returns the path of a sub-collection nested under this document.
    ///
    /// ```ignore
    /// let user = DocumentRef::new("users", "u1");
    /// assert_eq!(user.collection("posts"), "users/u1/posts");
    /// ```
    pub fn collection(&self, name: &str) -> String {
        format!("{}/{}", self.path(), name)
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A document exactly as the store returns it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub reference: DocumentRef,
    pub data: bson::Document,
}

impl RawRecord {
    pub fn new(reference: DocumentRef, data: bson::Document) -> Self {
        Self { reference, data }
    }

    pub fn id(&self) -> &StoreLocalId {
        self.reference.id()
    }

    /// Reads a stored field. Dotted paths (`author.name`) reach into nested documents.
    pub fn get(&self, field: &str) -> Option<&Bson> {
        let mut segments = field.split('.');
        let mut current = self.data.get(segments.next()?)?;

        for segment in segments {
            current = current.as_document()?.get(segment)?;
        }

        Some(current)
    }

    /// Reads the collection-group unique key stored in `field`.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentStoreError::Configuration`] if the field is absent or is not a string.
    pub fn unique_key(&self, field: &str) -> DocumentStoreResult<GlobalUniqueKey> {
        match self.data.get(field) {
            Some(Bson::String(value)) => Ok(GlobalUniqueKey::new(value.as_str())),
            Some(other) => Err(DocumentStoreError::Configuration(format!(
                "unique key field {field} on {} must be a string, found {:?}",
                self.reference,
                other.element_type(),
            ))),
            None => Err(DocumentStoreError::Configuration(format!(
                "unique key field {field} is missing on {}",
                self.reference,
            ))),
        }
    }
}

/// A typed document: its location plus the mapped payload.
///
/// The payload only holds the fields its type declares. The id and the reference are kept
/// beside it rather than merged into it, so writing a record back never leaks them into
/// the stored data.
#[derive(Debug, Clone, PartialEq)]
pub struct Record<T> {
    reference: DocumentRef,
    data: T,
}

impl<T> Record<T> {
    pub fn new(reference: DocumentRef, data: T) -> Self {
        Self { reference, data }
    }

    pub fn id(&self) -> &StoreLocalId {
        self.reference.id()
    }

    pub fn reference(&self) -> &DocumentRef {
        &self.reference
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut T {
        &mut self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    /// Projects the payload to plain JSON.
    pub fn to_json(&self) -> DocumentStoreResult<Value>
    where
        T: Serialize,
    {
        Ok(serde_json::to_value(&self.data)?)
    }
}

/// Conversion between raw store data and a typed payload.
///
/// A mapper is injected into a facade when it is constructed. Implement it by hand when the
/// stored shape differs from the payload type; otherwise use [`SerdeMapper`].
pub trait Mapper<T>: Send + Sync {
    /// Builds a payload from the stored data of a document.
    fn from_document(&self, document: bson::Document) -> DocumentStoreResult<T>;

    /// Produces the data to store for a payload.
    fn to_document(&self, data: &T) -> DocumentStoreResult<bson::Document>;

    /// Maps a raw record into a typed record.
    fn to_record(&self, raw: RawRecord) -> DocumentStoreResult<Record<T>> {
        let RawRecord { reference, data } = raw;

        Ok(Record::new(reference, self.from_document(data)?))
    }
}

/// Mapper that relies on the payload's `serde` implementations.
pub struct SerdeMapper<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> SerdeMapper<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for SerdeMapper<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SerdeMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SerdeMapper")
    }
}

impl<T> Mapper<T> for SerdeMapper<T>
where
    T: Serialize + DeserializeOwned,
{
    fn from_document(&self, document: bson::Document) -> DocumentStoreResult<T> {
        Ok(deserialize_from_document(document)?)
    }

    fn to_document(&self, data: &T) -> DocumentStoreResult<bson::Document> {
        Ok(serialize_to_document(data)?)
    }
}

/// Declares how a payload type participates in a collection group.
///
/// Store-local ids are not unique across the collections of a group, so each group-backed
/// type names the payload field that holds its [`GlobalUniqueKey`].
pub trait GroupDocument {
    /// Name shared by every collection of the group (the last path segment).
    const GROUP_NAME: &'static str;

    /// Payload field holding the unique key. Its stored value must be a string.
    const UNIQUE_KEY_FIELD: &'static str;
}
