//! Label derivation for objects managed on behalf of an App.
//!
//! The derived set is used both as object labels and as the Service
//! selector, so it must be deterministic for a given App spec.

use std::collections::BTreeMap;

use crate::crd::App;
use crate::error::{Error, Result};
use crate::types::Labels;

pub const NAME_LABEL: &str = "app.kubernetes.io/name";
pub const INSTANCE_LABEL: &str = "app.kubernetes.io/instance";
pub const VERSION_LABEL: &str = "app.kubernetes.io/version";
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

pub const APP_NAME: &str = "app";
pub const OPERATOR_NAME: &str = "app-operator";

const DEFAULT_TAG: &str = "latest";
const MAX_NAME_LEN: usize = 63;
const MAX_PREFIX_LEN: usize = 253;

/// Labels for objects owned by `app`.
///
/// `default_image` is used when the App does not set its own image. User
/// labels from `spec.metadata.labels` are kept unless they collide with an
/// operator-owned key.
pub fn labels_for(default_image: &str, name: &str, app: &App) -> Result<Labels> {
    let image = app
        .spec
        .image
        .as_deref()
        .filter(|image| !image.trim().is_empty())
        .unwrap_or(default_image);
    let version = image_tag(image)?;

    let mut labels: BTreeMap<String, String> = app
        .spec
        .metadata
        .as_ref()
        .and_then(|m| m.labels.clone())
        .unwrap_or_default();

    labels.extend([
        (NAME_LABEL.to_string(), APP_NAME.to_string()),
        (INSTANCE_LABEL.to_string(), name.to_string()),
        (VERSION_LABEL.to_string(), version.to_string()),
        (PART_OF_LABEL.to_string(), OPERATOR_NAME.to_string()),
        (MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string()),
    ]);

    for (key, value) in &labels {
        validate_key(key)?;
        validate_value(key, value)?;
    }

    Ok(Labels(labels))
}

/// Tag portion of an image reference, ignoring any digest.
pub fn image_tag(image: &str) -> Result<&str> {
    let image = image.trim();
    if image.is_empty() {
        return Err(Error::InvalidImage {
            image: image.to_string(),
            reason: "empty reference".to_string(),
        });
    }

    let repository = image.split('@').next().unwrap_or(image);
    let last_segment = repository.rfind('/').map_or(0, |i| i + 1);

    match repository[last_segment..].rfind(':') {
        Some(i) => {
            let tag = &repository[last_segment + i + 1..];
            if tag.is_empty() {
                return Err(Error::InvalidImage {
                    image: image.to_string(),
                    reason: "empty tag".to_string(),
                });
            }
            Ok(tag)
        }
        None => Ok(DEFAULT_TAG),
    }
}

fn validate_key(key: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidLabel {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let name = match key.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() || prefix.len() > MAX_PREFIX_LEN {
                return Err(invalid("prefix must be 1-253 characters"));
            }
            let prefix_ok = prefix.split('.').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
                    && !part.starts_with('-')
                    && !part.ends_with('-')
            });
            if !prefix_ok {
                return Err(invalid("prefix must be a DNS subdomain"));
            }
            name
        }
        None => key,
    };

    if name.is_empty() {
        return Err(invalid("name part must not be empty"));
    }
    check_segment(name).map_err(invalid)
}

fn validate_value(key: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Ok(());
    }
    check_segment(value).map_err(|reason| Error::InvalidLabel {
        key: key.to_string(),
        reason: format!("value {value:?} {reason}"),
    })
}

fn check_segment(segment: &str) -> std::result::Result<(), &'static str> {
    if segment.len() > MAX_NAME_LEN {
        return Err("must be at most 63 characters");
    }
    if !segment
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err("may only contain alphanumerics, '-', '_' or '.'");
    }
    let edges_ok = segment.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && segment.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());
    if !edges_ok {
        return Err("must start and end with an alphanumeric character");
    }
    Ok(())
}
