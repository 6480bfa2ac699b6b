//! CoRE link-format registration payloads
//!
//! Clients list their objects as `</1/0>,</3/0>,</5>`. A leading
//! `</path>;rt="oma.lwm2m"` link announces an alternate objects path that
//! prefixes the other links.

use crate::client_info::ClientObject;
use crate::error::{Lwm2mError, Lwm2mResult};
use lwm2m_core::Lwm2mPath;
use std::collections::BTreeMap;

const LWM2M_RESOURCE_TYPE: &str = "oma.lwm2m";

/// Objects announced in a registration payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisteredObjects {
    pub objects_path: Option<String>,
    pub objects: Vec<ClientObject>,
}

/// Parse a registration payload
///
/// # Errors
/// Returns `InvalidArgument` for a link that is not enclosed in `<>` or
/// does not address an object or an instance.
pub fn parse_link_format(payload: &str) -> Lwm2mResult<RegisteredObjects> {
    let mut objects_path: Option<String> = None;
    let mut objects: BTreeMap<u16, Vec<u16>> = BTreeMap::new();

    for link in payload.split(',').map(str::trim).filter(|l| !l.is_empty()) {
        let (target, attributes) = split_link(link)?;

        if is_lwm2m_root(attributes) {
            let path = target.trim_matches('/');
            objects_path = (!path.is_empty()).then(|| path.to_string());
            continue;
        }

        let relative = match objects_path.as_deref() {
            Some(prefix) => target
                .trim_start_matches('/')
                .strip_prefix(prefix)
                .ok_or_else(|| invalid(link))?,
            None => target,
        };
        let path = Lwm2mPath::from_string(relative).map_err(|_| invalid(link))?;
        let instances = objects.entry(path.object_id()).or_default();
        match (path.instance_id(), path.resource_id()) {
            (Some(iid), None) => {
                if !instances.contains(&iid) {
                    instances.push(iid);
                }
            }
            (None, None) => {}
            _ => return Err(invalid(link)),
        }
    }

    Ok(RegisteredObjects {
        objects_path,
        objects: objects
            .into_iter()
            .map(|(id, mut instances)| {
                instances.sort_unstable();
                ClientObject::new(id, instances)
            })
            .collect(),
    })
}

fn invalid(link: &str) -> Lwm2mError {
    Lwm2mError::InvalidArgument(format!("invalid link {:?}", link))
}

/// Split `<target>;attr;attr` into the target and the attribute list
fn split_link(link: &str) -> Lwm2mResult<(&str, &str)> {
    let rest = link.strip_prefix('<').ok_or_else(|| invalid(link))?;
    let (target, attributes) = rest.split_once('>').ok_or_else(|| invalid(link))?;
    Ok((target, attributes))
}

fn is_lwm2m_root(attributes: &str) -> bool {
    attributes
        .split(';')
        .filter_map(|a| a.trim().split_once('='))
        .any(|(key, value)| key == "rt" && value.trim_matches('"') == LWM2M_RESOURCE_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_objects() {
        let parsed = parse_link_format("</1/0>,</3/0>,</5>,</3/2>").unwrap();
        assert_eq!(parsed.objects_path, None);
        assert_eq!(
            parsed.objects,
            vec![
                ClientObject::new(1, vec![0]),
                ClientObject::new(3, vec![0, 2]),
                ClientObject::new(5, vec![]),
            ]
        );
    }

    #[test]
    fn test_parse_objects_path() {
        let parsed =
            parse_link_format("</lwm2m>;rt=\"oma.lwm2m\",</lwm2m/1/0>,</lwm2m/3/0>").unwrap();
        assert_eq!(parsed.objects_path.as_deref(), Some("lwm2m"));
        assert_eq!(parsed.objects.len(), 2);
    }

    #[test]
    fn test_parse_empty_payload() {
        assert_eq!(parse_link_format("").unwrap(), RegisteredObjects::default());
    }

    #[test]
    fn test_parse_rejects_bad_links() {
        assert!(parse_link_format("/1/0").is_err());
        assert!(parse_link_format("</1/0").is_err());
        assert!(parse_link_format("</1/0/3>").is_err());
        assert!(parse_link_format("</a/b>").is_err());
    }
}
