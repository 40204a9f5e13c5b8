//! Secret fetching utilities for Kubernetes secrets

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};

use crate::crd::SecretKeyRef;
use crate::error::{Error, Result};

/// Fetch a secret from Kubernetes
pub async fn get_secret(client: &Client, name: &str, namespace: &str) -> Result<Secret> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    secrets.get(name).await.map_err(|e| match e {
        kube::Error::Api(api_err) if api_err.code == 404 => {
            Error::credentials(format!("secret {}/{} not found", namespace, name))
        }
        other => Error::Kube(other),
    })
}

/// Get a string value from a secret, optionally base64 decoding it
pub fn get_secret_string(secret: &Secret, key: &str, base64: bool) -> Result<String> {
    let name = secret.metadata.name.clone().unwrap_or_default();
    let bytes = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .ok_or_else(|| Error::credentials(format!("key '{}' not found in secret '{}'", key, name)))?;

    decode_secret_value(&bytes.0, base64)
        .map_err(|e| Error::credentials(format!("secret '{}' key '{}': {}", name, key, e)))
}

/// Turn raw secret data into a string, dropping one trailing newline
pub fn decode_secret_value(raw: &[u8], base64: bool) -> std::result::Result<String, String> {
    let bytes = if base64 {
        let encoded = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
        STANDARD
            .decode(encoded.trim())
            .map_err(|e| format!("invalid base64: {}", e))?
    } else {
        raw.to_vec()
    };

    let value = String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {}", e))?;
    Ok(value.strip_suffix('\n').unwrap_or(&value).to_string())
}

/// Resolve a [`SecretKeyRef`], defaulting its namespace to `namespace`
pub async fn resolve_secret_ref(client: &Client, reference: &SecretKeyRef, namespace: &str) -> Result<String> {
    let namespace = reference.namespace.as_deref().unwrap_or(namespace);
    let secret = get_secret(client, &reference.name, namespace).await?;
    get_secret_string(&secret, &reference.key, reference.base64)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;

    use super::*;

    fn secret(key: &str, value: &[u8]) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), ByteString(value.to_vec()));
        Secret {
            metadata: ObjectMeta {
                name: Some("influx-backup-creds".to_string()),
                ..Default::default()
            },
            data: Some(data),
            ..Default::default()
        }
    }

    #[test]
    fn test_trailing_newline_is_trimmed() {
        assert_eq!(decode_secret_value(b"AKIA123\n", false).unwrap(), "AKIA123");
        assert_eq!(decode_secret_value(b"AKIA123", false).unwrap(), "AKIA123");
    }

    #[test]
    fn test_base64_values_are_decoded() {
        // "secret\n" encoded
        assert_eq!(decode_secret_value(b"c2VjcmV0Cg==", true).unwrap(), "secret");
        assert!(decode_secret_value(b"not base64!", true).is_err());
    }

    #[test]
    fn test_missing_key_is_a_credential_error() {
        let s = secret("awsAccessKeyId", b"AKIA");
        let err = get_secret_string(&s, "awsSecretAccessKey", false).unwrap_err();
        assert!(matches!(err, Error::CredentialResolution(_)));
        assert_eq!(get_secret_string(&s, "awsAccessKeyId", false).unwrap(), "AKIA");
    }
}
