//! Binding resolution and operation URL assembly.

use std::collections::BTreeMap;

use dor_codec::url_encode;
use dor_session::{Reader, RepositoryConfig, RepositoryError, RepositoryResult};
use dor_types::{
    ControlGroup, Datastream, DisseminationBindingInfo, Disseminator, MechanismMethod,
    MechanismSpec, Pid, Timestamp,
};

/// Where a mechanism can fetch `ds` from.
///
/// External datastreams are passed on as their own URL; inline and
/// managed content is served by the repository itself.
pub fn datastream_location(pid: &Pid, ds: &Datastream, config: &RepositoryConfig) -> String {
    match (ds.control_group, ds.location.as_deref()) {
        (ControlGroup::ExternalReference, Some(url)) => url.to_string(),
        _ => config.datastream_url(pid.as_str(), &ds.id),
    }
}

/// Resolve every datastream `method` needs through the disseminator's
/// binding map, in binding key then sequence order.
pub fn binding_info(
    reader: &Reader,
    diss: &Disseminator,
    mechanism: &MechanismSpec,
    method: &MechanismMethod,
    config: &RepositoryConfig,
    as_of: Option<&Timestamp>,
) -> RepositoryResult<Vec<DisseminationBindingInfo>> {
    let mut resolved = Vec::new();
    for key in method.binding_keys() {
        let bindings = diss.binding_map.bindings_for(key);
        if bindings.is_empty() {
            return Err(RepositoryError::ObjectIntegrity(format!(
                "{} binds no datastream to {key} for {}",
                diss.id, method.def.name
            )));
        }
        for binding in bindings {
            let ds = reader.datastream(&binding.datastream_id, as_of)?;
            resolved.push(DisseminationBindingInfo {
                binding_key: key.to_string(),
                datastream_location: datastream_location(reader.pid(), &ds, config),
                datastream_id: ds.id,
                datastream_version_id: ds.version_id,
                control_group: ds.control_group,
                datastream_state: ds.state.unwrap_or_default(),
                datastream_created: ds.created,
                mime_type: ds.mime_type,
                address_location: mechanism.address.clone(),
                operation_location: method.operation_location.clone(),
                protocol: mechanism.protocol.clone(),
                method_parms: method.def.parms.clone(),
            });
        }
    }
    Ok(resolved)
}

/// Fill the operation template of `method` into a URL.
///
/// `(KEY)` placeholders take the url-encoded locations bound to `KEY`
/// (joined with `+` when several are bound); `(name)` placeholders take
/// url-encoded parameter values. Placeholders left over afterwards belong
/// to omitted optional parameters and are dropped.
pub fn operation_url(
    address: &str,
    operation_location: &str,
    bindings: &[DisseminationBindingInfo],
    parms: &BTreeMap<String, String>,
) -> String {
    let mut url = if operation_location.starts_with("http://")
        || operation_location.starts_with("https://")
    {
        operation_location.to_string()
    } else {
        format!("{address}{operation_location}")
    };

    let mut by_key: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for info in bindings {
        by_key
            .entry(info.binding_key.as_str())
            .or_default()
            .push(url_encode(&info.datastream_location));
    }
    for (key, locations) in by_key {
        url = url.replace(&format!("({key})"), &locations.join("+"));
    }
    for (name, value) in parms {
        url = url.replace(&format!("({name})"), &url_encode(value));
    }
    strip_placeholders(&url)
}

fn strip_placeholders(url: &str) -> String {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(open) = rest.find('(') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        match tail.find(')') {
            Some(close) if is_placeholder(&tail[..close]) => rest = &tail[close + 1..],
            _ => {
                out.push('(');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_placeholder(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
