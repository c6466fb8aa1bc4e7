//! OpenAPI 3.x specification loader.
//!
//! Reads YAML/JSON documents into an immutable [`Specification`]: paths,
//! operations, parameters, request bodies, security schemes and schemas,
//! with every local `$ref` resolved into a shared link up front.

pub mod error;
pub mod model;
pub mod parser;
mod resolve;
pub mod schema;

pub use error::SpecParseError;
pub use model::{
    ApiKeyLocation, HttpScheme, MediaTypeSpec, Operation, ParameterLocation, ParameterSpec,
    ParameterStyle, PathItem, RequestBodySpec, RequiredScheme, ResponseSpec, SecurityRequirement,
    SecurityScheme, Server, Specification,
};
pub use parser::{parse_spec, parse_spec_file, template_placeholders};
pub use schema::{AdditionalProperties, Bound, Pattern, Schema, SchemaType};
