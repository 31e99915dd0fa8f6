//! Merging and validating method parameters.

use std::collections::BTreeMap;

use tracing::warn;

use dor_session::{RepositoryError, RepositoryResult};
use dor_types::{MethodDef, ParmKind};

/// Parameter values a dissemination will run with.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergedParms {
    pub values: BTreeMap<String, String>,
    /// Empty values that had no default to fall back on.
    pub warnings: Vec<String>,
}

/// Combine caller values with the defaults `method` declares.
///
/// Caller values win. Declared defaults only fill optional parameters the
/// caller left out, or any parameter the caller left empty, and fixed
/// (`DefaultInputParm`) values are always added. Fails with
/// `InvalidUserParm` when the caller names a parameter the method does not
/// declare, leaves out a required one (even one with a default), or
/// supplies a value outside a restricted domain.
pub fn merge_parms(
    method: &MethodDef,
    user: &BTreeMap<String, String>,
) -> RepositoryResult<MergedParms> {
    for name in user.keys() {
        let declared = method
            .parm(name)
            .is_some_and(|p| p.kind == ParmKind::User);
        if !declared {
            return Err(RepositoryError::InvalidUserParm(format!(
                "method {} has no parameter {name}",
                method.name
            )));
        }
    }

    let mut merged = MergedParms::default();
    for parm in &method.parms {
        match parm.kind {
            ParmKind::Datastream => {}
            ParmKind::Default => {
                if let Some(value) = &parm.default_value {
                    merged.values.insert(parm.name.clone(), value.clone());
                }
            }
            ParmKind::User => {
                let value = match (user.get(&parm.name), &parm.default_value) {
                    (Some(v), _) if !v.is_empty() => {
                        if !parm.allows(v) {
                            return Err(RepositoryError::InvalidUserParm(format!(
                                "value {v:?} is not allowed for {} of method {}",
                                parm.name, method.name
                            )));
                        }
                        v.clone()
                    }
                    (None, _) if parm.required => {
                        return Err(RepositoryError::InvalidUserParm(format!(
                            "method {} requires parameter {}",
                            method.name, parm.name
                        )));
                    }
                    (_, Some(default)) => default.clone(),
                    (Some(_), None) => {
                        warn!(method = %method.name, parm = %parm.name, "empty value with no default");
                        merged
                            .warnings
                            .push(format!("{} is empty and has no default", parm.name));
                        String::new()
                    }
                    (None, None) => continue,
                };
                merged.values.insert(parm.name.clone(), value);
            }
        }
    }
    Ok(merged)
}
