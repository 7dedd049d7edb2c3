//! Request catalog for studiolink.
//!
//! Loads the declarative catalog published by the studio and compiles it
//! into binding descriptors the control surface can render.

pub mod compiler;
pub mod error;
pub mod fields;
pub mod model;
pub mod naming;
pub mod options;

pub use compiler::{
    compile, expression_field_id, BindingDescriptor, BindingKind, BindingRole, CompiledBindings,
    CompilerConfig, USE_EXPRESSION_FIELD_ID,
};
pub use error::{CatalogError, SchemaError};
pub use fields::{ControlField, FieldShape, Visibility};
pub use model::{
    Catalog, ParamOption, Parameter, ParameterProperty, ParameterType, Range, RequestDefinition,
    RequestMethod,
};
pub use options::{Choice, OptionTopic, OptionsCache, DEFAULT_CHOICE_ID};
