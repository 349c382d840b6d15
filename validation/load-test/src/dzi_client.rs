//! HTTP client for Deep Zoom Image servers.
//!
//! Fetches the slide descriptor and individual tiles, and understands both
//! descriptor encodings in the wild: the DZI XML document and the JSON form
//! (`{"Image": {...}}`) accepted by OpenSeadragon.

use crate::error::{RequestError, RequestResult};
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::Serialize;
use std::time::Duration;

/// Thin wrapper over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct DziClient {
    client: reqwest::Client,
}

impl DziClient {
    /// Build a client. Without a timeout, requests wait indefinitely.
    pub fn new(timeout: Option<Duration>, max_idle_per_host: usize) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().pool_max_idle_per_host(max_idle_per_host);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }

    /// GET the descriptor and return its body verbatim.
    pub async fn fetch_descriptor(&self, url: &str) -> RequestResult<String> {
        let response = self.get(url).await?;
        response.text().await.map_err(|source| RequestError::Body {
            url: url.to_string(),
            source,
        })
    }

    /// GET a tile and return the length of its body in bytes.
    pub async fn fetch_tile(&self, url: &str) -> RequestResult<usize> {
        let response = self.get(url).await?;
        let body = response.bytes().await.map_err(|source| RequestError::Body {
            url: url.to_string(),
            source,
        })?;
        Ok(body.len())
    }

    async fn get(&self, url: &str) -> RequestResult<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| RequestError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(RequestError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response)
    }
}

/// Image geometry advertised by a DZI descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DziDescriptor {
    pub format: String,
    pub overlap: u32,
    pub tile_size: u32,
    pub width: u64,
    pub height: u64,
}

impl DziDescriptor {
    /// Parse either descriptor encoding.
    pub fn parse(body: &str) -> RequestResult<Self> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('{') {
            Self::parse_json(trimmed)
        } else {
            Self::parse_xml(trimmed)
        }
    }

    fn parse_json(body: &str) -> RequestResult<Self> {
        let json: serde_json::Value =
            serde_json::from_str(body).map_err(|e| RequestError::Descriptor(e.to_string()))?;
        let image = &json["Image"];
        if image.is_null() {
            return Err(RequestError::Descriptor("missing Image object".to_string()));
        }

        let descriptor = Self {
            format: image["Format"]
                .as_str()
                .ok_or_else(|| RequestError::Descriptor("missing Format".to_string()))?
                .to_string(),
            overlap: json_number(&image["Overlap"], "Overlap")? as u32,
            tile_size: json_number(&image["TileSize"], "TileSize")? as u32,
            width: json_number(&image["Size"]["Width"], "Width")?,
            height: json_number(&image["Size"]["Height"], "Height")?,
        };
        descriptor.checked()
    }

    fn parse_xml(body: &str) -> RequestResult<Self> {
        let mut reader = Reader::from_str(body);
        reader.trim_text(true);

        let mut buf = Vec::new();
        let mut format = None;
        let mut overlap = None;
        let mut tile_size = None;
        let mut width = None;
        let mut height = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"Image" => {
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match attr.key.as_ref() {
                                b"Format" => format = Some(value),
                                b"Overlap" => overlap = Some(xml_number(&value, "Overlap")?),
                                b"TileSize" => tile_size = Some(xml_number(&value, "TileSize")?),
                                _ => {}
                            }
                        }
                    }
                    b"Size" => {
                        for attr in e.attributes().flatten() {
                            let value = String::from_utf8_lossy(&attr.value).to_string();
                            match attr.key.as_ref() {
                                b"Width" => width = Some(xml_number(&value, "Width")?),
                                b"Height" => height = Some(xml_number(&value, "Height")?),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(RequestError::Descriptor(format!(
                        "XML parsing error at position {}: {:?}",
                        reader.buffer_position(),
                        e
                    )))
                }
                _ => {}
            }
            buf.clear();
        }

        let missing = |name: &str| RequestError::Descriptor(format!("missing {}", name));
        let descriptor = Self {
            format: format.ok_or_else(|| missing("Format"))?,
            overlap: overlap.ok_or_else(|| missing("Overlap"))? as u32,
            tile_size: tile_size.ok_or_else(|| missing("TileSize"))? as u32,
            width: width.ok_or_else(|| missing("Width"))?,
            height: height.ok_or_else(|| missing("Height"))?,
        };
        descriptor.checked()
    }

    fn checked(self) -> RequestResult<Self> {
        if self.tile_size == 0 {
            return Err(RequestError::Descriptor("TileSize must be > 0".to_string()));
        }
        if self.width == 0 || self.height == 0 {
            return Err(RequestError::Descriptor(format!(
                "image size {}x{} is empty",
                self.width, self.height
            )));
        }
        Ok(self)
    }

    /// Pixel size of every Deep Zoom level, level 0 (1x1) first.
    ///
    /// Each level halves the one above it, rounding up, until both sides
    /// reach one pixel.
    pub fn level_dimensions(&self) -> Vec<(u64, u64)> {
        let mut size = (self.width, self.height);
        let mut levels = vec![size];
        while size.0 > 1 || size.1 > 1 {
            size = (size.0.div_ceil(2).max(1), size.1.div_ceil(2).max(1));
            levels.push(size);
        }
        levels.reverse();
        levels
    }

    pub fn level_count(&self) -> u32 {
        self.level_dimensions().len() as u32
    }

    /// Tile columns and rows at `level`, or `None` past the deepest level.
    pub fn tile_grid(&self, level: u32) -> Option<(u64, u64)> {
        let tile_size = self.tile_size as u64;
        self.level_dimensions()
            .get(level as usize)
            .map(|(w, h)| (w.div_ceil(tile_size), h.div_ceil(tile_size)))
    }
}

fn json_number(value: &serde_json::Value, name: &str) -> RequestResult<u64> {
    // Servers disagree on whether numbers are quoted.
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| RequestError::Descriptor(format!("missing or invalid {}", name)))
}

fn xml_number(value: &str, name: &str) -> RequestResult<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| RequestError::Descriptor(format!("invalid {}: {:?}", name, value)))
}
