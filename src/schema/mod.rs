//! Schema definitions: models, fields, the registry and relation metadata.

pub mod behaviour;
pub mod field;
pub mod io;
pub mod meta;
pub mod model;
pub mod register;

pub use behaviour::Behaviour;
pub use field::{Field, FieldKind, PropertyType, Relation, RelationKind, ValidatorSpec};
pub use io::{JsonModelIo, ModelIo};
pub use meta::{CompactMeta, ForeignKey, ModelMeta, RelationMeta};
pub use model::{Index, Model, Table, PRIMARY_KEY};
pub use register::{link_model_name, localized_model_name, ModelRegister};
