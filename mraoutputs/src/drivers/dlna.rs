//! DLNA / UPnP AV output driver.
//!
//! Drives a classic MediaRenderer through AVTransport and RenderingControl
//! SOAP actions. The renderer pulls the encoded stream from the session's
//! HTTP URL.

use async_trait::async_trait;
use tracing::debug;

use mramodel::PlaybackSession;

use crate::capabilities::ZoneOutput;
use crate::error::OutputError;
use crate::soap::SoapClient;

const AVTRANSPORT_SERVICE: &str = "urn:schemas-upnp-org:service:AVTransport:1";
const RENDERING_SERVICE: &str = "urn:schemas-upnp-org:service:RenderingControl:1";

pub struct DlnaOutput {
    avtransport_url: String,
    rendering_url: String,
    soap: SoapClient,
}

impl DlnaOutput {
    pub fn new(avtransport_url: String, rendering_url: String, soap: SoapClient) -> Self {
        Self {
            avtransport_url,
            rendering_url,
            soap,
        }
    }

    fn stream_url<'a>(&self, session: &'a PlaybackSession) -> Result<&'a str, OutputError> {
        session
            .streams
            .first()
            .map(|s| s.url.as_str())
            .ok_or_else(|| OutputError::action_failed("dlna", "play", "session has no stream"))
    }

    fn didl_metadata(session: &PlaybackSession) -> String {
        let title = session.metadata.title.as_deref().unwrap_or("MRAudio");
        let artist = session.metadata.artist.as_deref().unwrap_or_default();
        format!(
            "<DIDL-Lite xmlns=\"urn:schemas-upnp-org:metadata-1-0/DIDL-Lite/\" \
             xmlns:dc=\"http://purl.org/dc/elements/1.1/\" \
             xmlns:upnp=\"urn:schemas-upnp-org:metadata-1-0/upnp/\">\
             <item id=\"0\" parentID=\"-1\" restricted=\"1\">\
             <dc:title>{title}</dc:title><dc:creator>{artist}</dc:creator>\
             <upnp:class>object.item.audioItem.musicTrack</upnp:class>\
             </item></DIDL-Lite>"
        )
    }

    async fn avtransport(&self, action: &str, args: &[(&str, &str)]) -> Result<(), OutputError> {
        self.soap
            .invoke(&self.avtransport_url, AVTRANSPORT_SERVICE, action, args)
            .await
            .map(|_| ())
            .map_err(|e| OutputError::action_failed("dlna", action, e.to_string()))
    }
}

#[async_trait]
impl ZoneOutput for DlnaOutput {
    fn type_name(&self) -> &str {
        "dlna"
    }

    async fn play(&self, session: &PlaybackSession) -> Result<(), OutputError> {
        let url = self.stream_url(session)?;
        let metadata = Self::didl_metadata(session);
        self.avtransport(
            "SetAVTransportURI",
            &[
                ("InstanceID", "0"),
                ("CurrentURI", url),
                ("CurrentURIMetaData", &metadata),
            ],
        )
        .await?;
        self.avtransport("Play", &[("InstanceID", "0"), ("Speed", "1")])
            .await
    }

    async fn pause(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.avtransport("Pause", &[("InstanceID", "0")]).await
    }

    async fn resume(&self, _session: &PlaybackSession) -> Result<(), OutputError> {
        self.avtransport("Play", &[("InstanceID", "0"), ("Speed", "1")])
            .await
    }

    async fn stop(&self, _session: Option<&PlaybackSession>) -> Result<(), OutputError> {
        self.avtransport("Stop", &[("InstanceID", "0")]).await
    }

    async fn set_volume(&self, level: u32) -> Result<(), OutputError> {
        let level = level.to_string();
        self.soap
            .invoke(
                &self.rendering_url,
                RENDERING_SERVICE,
                "SetVolume",
                &[
                    ("InstanceID", "0"),
                    ("Channel", "Master"),
                    ("DesiredVolume", &level),
                ],
            )
            .await
            .map(|_| ())
            .map_err(|e| OutputError::action_failed("dlna", "SetVolume", e.to_string()))
    }

    async fn update_metadata(&self, session: &PlaybackSession) -> Result<(), OutputError> {
        debug!(title = ?session.metadata.title, "dlna metadata refresh deferred to next uri set");
        Ok(())
    }
}
