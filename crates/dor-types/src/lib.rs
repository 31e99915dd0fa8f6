//! Object model for the Digital Object Repository (DOR).
//!
//! This crate provides the entities and codes shared by every other DOR
//! crate. Every other DOR crate depends on `dor-types`.
//!
//! # Key Types
//!
//! - [`Pid`] -- Persistent identifier (`namespace:id`) of a digital object
//! - [`DigitalObject`] -- Typed container of versioned datastreams and disseminators
//! - [`Datastream`] -- One version of a content unit (inline XML, managed, or external)
//! - [`Disseminator`] -- One version of a behavior binding with its [`DsBindingMap`]
//! - [`MethodDef`] / [`MethodParmDef`] -- Behavior method contracts and parameter domains
//! - [`MechanismSpec`] -- A mechanism's concrete service binding for its methods
//! - [`MimeTypedStream`] -- The result of a dissemination
//! - [`Triple`] -- A relationship statement held by the resource index

pub mod audit;
pub mod datastream;
pub mod disseminator;
pub mod error;
pub mod method;
pub mod object;
pub mod pid;
pub mod relation;
pub mod stream;
pub mod temporal;

pub use audit::AuditRecord;
pub use datastream::{ComponentState, ControlGroup, Datastream, InlineXml, LocationKind, MdClass};
pub use disseminator::{Disseminator, DsBinding, DsBindingMap};
pub use error::TypeError;
pub use method::{
    BehaviorSpec, MechanismMethod, MechanismSpec, MethodDef, MethodParmDef, ObjectMethodsDef,
    ParmKind, PassBy, Protocol,
};
pub use object::{DigitalObject, ObjectKind, ObjectState};
pub use pid::Pid;
pub use relation::{Triple, TripleObject};
pub use stream::{DisseminationBindingInfo, MimeTypedStream, Property};
pub use temporal::{format_timestamp, now_utc, parse_timestamp, Timestamp};
