//! flowgraph-attributes: modelo neutral de atributos tipados.
//!
//! Rol en el sistema:
//! - Describe el contrato estático de los datos que fluyen entre steps
//!   (`AttributeSpec`: rol, tipo, default, for_each, mapping).
//! - La validación (`validate`) es pura, sin I/O, y produce un error nombrado
//!   por cada modo de fallo descrito en la especificación.
//! - No conoce nada del motor de ejecución, el catálogo ni el planner; esos
//!   viven en `flowgraph-core` y dependen de este crate.
pub mod attr_type;
pub mod error;
pub mod mapping;
pub mod role;
pub mod spec;
pub mod validate;

pub use attr_type::AttrType;
pub use error::AttributeError;
pub use mapping::Mapping;
pub use role::Role;
pub use spec::AttributeSpec;
pub use validate::{parse_type, validate_attribute, validate_attribute_set};
