//! Minimal SOAP client for UPnP-style renderers (DLNA, Sonos).

use std::collections::HashMap;
use std::time::Duration;

use quick_xml::escape::escape;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SoapFault {
    #[error("http {status} from {url}")]
    HttpStatus { status: u16, url: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("upnp error {code}: {description}")]
    Upnp { code: String, description: String },
    #[error("missing element {0} in SOAP body")]
    MissingElement(String),
}

/// Stateless SOAP action invoker.
#[derive(Clone)]
pub struct SoapClient {
    http: reqwest::Client,
}

impl SoapClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { http }
    }

    fn envelope(service_type: &str, action: &str, args: &[(&str, &str)]) -> String {
        let mut body = String::new();
        for (name, value) in args {
            body.push_str(&format!("<{name}>{}</{name}>", escape(*value)));
        }
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
             <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
             s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
             <s:Body><u:{action} xmlns:u=\"{service_type}\">{body}</u:{action}></s:Body>\
             </s:Envelope>"
        )
    }

    /// Invokes `action` on `control_url` and returns the response body.
    pub async fn invoke(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
    ) -> Result<String, SoapFault> {
        let envelope = Self::envelope(service_type, action, args);
        debug!(url = control_url, action, "soap call");

        let response = self
            .http
            .post(control_url)
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .header("SOAPACTION", format!("\"{service_type}#{action}\""))
            .body(envelope)
            .send()
            .await
            .map_err(|e| SoapFault::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SoapFault::Transport(e.to_string()))?;

        if !status.is_success() {
            if let Some(code) = extract_element(&body, "errorCode") {
                let description =
                    extract_element(&body, "errorDescription").unwrap_or_default();
                return Err(SoapFault::Upnp { code, description });
            }
            return Err(SoapFault::HttpStatus {
                status: status.as_u16(),
                url: control_url.to_string(),
            });
        }

        Ok(body)
    }

    /// Invokes `action` and extracts the named return elements.
    pub async fn invoke_extract(
        &self,
        control_url: &str,
        service_type: &str,
        action: &str,
        args: &[(&str, &str)],
        wanted: &[&str],
    ) -> Result<HashMap<String, String>, SoapFault> {
        let body = self.invoke(control_url, service_type, action, args).await?;
        let mut values = HashMap::new();
        for name in wanted {
            let value = extract_element(&body, name)
                .ok_or_else(|| SoapFault::MissingElement(name.to_string()))?;
            values.insert(name.to_string(), value);
        }
        Ok(values)
    }
}

/// Extracts the text content of the first `<tag>` element.
///
/// Renderer responses are flat, namespace-light bodies; a scan for the
/// element boundaries is all that is needed.
pub(crate) fn extract_element(xml: &str, tag: &str) -> Option<String> {
    let open_plain = format!("<{tag}>");
    let open_attr = format!("<{tag} ");
    let close = format!("</{tag}>");

    let start = if let Some(pos) = xml.find(&open_plain) {
        pos + open_plain.len()
    } else {
        let pos = xml.find(&open_attr)?;
        xml[pos..].find('>').map(|end| pos + end + 1)?
    };

    let end = xml[start..].find(&close)? + start;
    Some(unescape_basic(&xml[start..end]))
}

fn unescape_basic(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let envelope = SoapClient::envelope(
            "urn:schemas-upnp-org:service:AVTransport:1",
            "Play",
            &[("InstanceID", "0"), ("Speed", "1")],
        );
        assert!(envelope.contains("<u:Play xmlns:u=\"urn:schemas-upnp-org:service:AVTransport:1\">"));
        assert!(envelope.contains("<InstanceID>0</InstanceID>"));
        assert!(envelope.contains("<Speed>1</Speed>"));
    }

    #[test]
    fn test_envelope_escapes_values() {
        let envelope = SoapClient::envelope(
            "urn:x:1",
            "SetAVTransportURI",
            &[("CurrentURI", "http://host/a?b=1&c=<2>")],
        );
        assert!(envelope.contains("b=1&amp;c=&lt;2&gt;"));
    }

    #[test]
    fn test_extract_element() {
        let xml = "<s:Body><u:GetVolumeResponse><CurrentVolume>42</CurrentVolume></u:GetVolumeResponse></s:Body>";
        assert_eq!(extract_element(xml, "CurrentVolume"), Some("42".to_string()));
        assert_eq!(extract_element(xml, "Missing"), None);
    }

    #[test]
    fn test_extract_element_with_attributes() {
        let xml = "<TransportState val=\"x\">PLAYING</TransportState>";
        assert_eq!(
            extract_element(xml, "TransportState"),
            Some("PLAYING".to_string())
        );
    }
}
