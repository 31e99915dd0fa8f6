//! Dissemination layer of the Digital Object Repository.
//!
//! Resolves a behavior method invoked on an object into a call on the
//! mechanism bound to it: the disseminator is located, caller parameters
//! are merged with declared defaults and validated, the datastreams the
//! method consumes are resolved through the binding map, and the result
//! is fetched (or handed back as a redirect).
//!
//! # Key Types
//!
//! - [`DisseminationResolver`] -- method calls to byte streams
//! - [`ResolvedRequest`] -- a call resolved to its service URL
//! - [`MergedParms`] -- caller values merged with declared defaults
//! - [`DynamicMethod`] -- a built-in method every object answers

pub mod binding;
pub mod dynamic;
pub mod params;
pub mod resolver;

pub use binding::{binding_info, datastream_location, operation_url};
pub use dynamic::{DynamicCall, DynamicMethod, DYNAMIC_BDEF, DYNAMIC_METHODS};
pub use params::{merge_parms, MergedParms};
pub use resolver::{DisseminationResolver, ResolvedRequest};
