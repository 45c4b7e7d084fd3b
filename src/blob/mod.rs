//! 图片 blob 存储：place_images.bin 里每张图是一个独立的混淆 zlib 块。
//!
//! 引用（offset, length）来自地点记录或图片索引；解码后按 max_pixel 缩略，统一输出 PNG。

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::codec::DecodePipeline;
use crate::config::StoreConfig;
use crate::core::ImageRef;
use crate::error::{Result, StoreError};
use crate::stats::StoreStats;
use crate::storage::{PayloadFile, ResourceResolver};

#[derive(Debug, Deserialize)]
struct ImageIndexFile {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    payload_file: Option<String>,
    #[serde(default)]
    payload_sha256: Option<String>,
    #[serde(default)]
    payload_size_bytes: Option<u64>,
    #[serde(default)]
    images: HashMap<String, ImageEntry>,
}

#[derive(Debug, Deserialize)]
struct ImageEntry {
    image_payload_offset: u64,
    image_payload_length: usize,
    #[serde(default)]
    image_payload_sha256: Option<String>,
}

/// place id → 图片引用
#[derive(Clone, Debug, Default)]
pub struct ImageIndex {
    pub version: u32,
    pub payload_file: Option<String>,
    pub payload_sha256: Option<String>,
    pub payload_size_bytes: Option<u64>,
    refs: HashMap<String, ImageRef>,
}

impl ImageIndex {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let file: ImageIndexFile = serde_json::from_slice(bytes)?;
        let refs = file
            .images
            .into_iter()
            .map(|(id, e)| {
                (
                    id,
                    ImageRef {
                        offset: e.image_payload_offset,
                        length: e.image_payload_length,
                        sha256: e.image_payload_sha256,
                    },
                )
            })
            .collect();
        Ok(Self {
            version: file.version,
            payload_file: file.payload_file,
            payload_sha256: file.payload_sha256,
            payload_size_bytes: file.payload_size_bytes,
            refs,
        })
    }

    pub fn get(&self, place_id: &str) -> Option<&ImageRef> {
        self.refs.get(place_id)
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// 缩略后的 PNG
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: u32,
    pub height: u32,
    pub png: Vec<u8>,
}

pub struct ImageStore {
    index: ImageIndex,
    payload: Option<PayloadFile>,
    pipeline: DecodePipeline,
    min_max_pixel: u32,
    verify_sha256: bool,
    stats: Arc<StoreStats>,
}

impl ImageStore {
    /// 索引可缺省（仍可用记录里自带的引用）；payload 缺失时所有读取返回 None
    pub fn open(resolver: &ResourceResolver, config: &StoreConfig) -> Self {
        let index = match resolver.resolve(&config.image_index_file) {
            Some(path) => match std::fs::read(&path)
                .map_err(StoreError::from)
                .and_then(|b| ImageIndex::parse(&b))
            {
                Ok(idx) => idx,
                Err(e) => {
                    tracing::warn!("image index {:?} unreadable: {}", path, e);
                    ImageIndex::default()
                }
            },
            None => ImageIndex::default(),
        };

        let payload = resolver
            .resolve_first(
                index
                    .payload_file
                    .as_deref()
                    .into_iter()
                    .chain(std::iter::once(config.default_image_payload_file.as_str())),
            )
            .and_then(|p| match PayloadFile::open(p) {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::warn!("image payload unavailable: {}", e);
                    None
                }
            });
        match &payload {
            Some(p) => tracing::info!(
                "Image store: {} indexed images, payload {:?} ({} bytes)",
                index.len(),
                p.path(),
                p.len()
            ),
            None => tracing::warn!("Image payload not found, images disabled"),
        }

        Self {
            index,
            payload,
            pipeline: DecodePipeline::for_blobs(&config.obfuscation_seed),
            min_max_pixel: config.image.min_max_pixel,
            verify_sha256: config.verify_payload_sha256,
            stats: Arc::new(StoreStats::default()),
        }
    }

    /// 与 PlaceStore 共用计数
    pub fn with_stats(mut self, stats: Arc<StoreStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn is_available(&self) -> bool {
        self.payload.is_some()
    }

    pub fn index(&self) -> &ImageIndex {
        &self.index
    }

    pub fn image_ref_for(&self, place_id: &str) -> Option<&ImageRef> {
        self.index.get(place_id)
    }

    pub fn load_place_image(&self, place_id: &str, max_pixel: u32) -> Option<Thumbnail> {
        let image = self.image_ref_for(place_id)?;
        self.load_image(image, max_pixel)
    }

    pub fn load_image(&self, image: &ImageRef, max_pixel: u32) -> Option<Thumbnail> {
        match self.try_load(image, max_pixel) {
            Ok(t) => {
                StoreStats::incr(&self.stats.images_served);
                Some(t)
            }
            Err(e) => {
                tracing::warn!("image {}+{} failed: {}", image.offset, image.length, e);
                None
            }
        }
    }

    fn try_load(&self, image: &ImageRef, max_pixel: u32) -> Result<Thumbnail> {
        let payload = self
            .payload
            .as_ref()
            .ok_or_else(|| StoreError::MissingResource("image payload".to_string()))?;
        let raw = payload.read_range(image.offset, image.length)?;
        if self.verify_sha256 {
            if let Some(expected) = image.sha256.as_deref() {
                let actual = hex::encode(Sha256::digest(&raw));
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(StoreError::Integrity(format!(
                        "image sha256 mismatch: expected {}, got {}",
                        expected, actual
                    )));
                }
            }
        }
        let bytes = self.pipeline.decode_blob(&raw)?;
        let decoded = image::load_from_memory(&bytes)?;
        encode_thumbnail(decoded, max_pixel.max(self.min_max_pixel))
    }
}

/// 长边超过 max_pixel 才缩略（保持宽高比）
fn encode_thumbnail(img: DynamicImage, max_pixel: u32) -> Result<Thumbnail> {
    let (w, h) = img.dimensions();
    let img = if w > max_pixel || h > max_pixel {
        img.thumbnail(max_pixel, max_pixel)
    } else {
        img
    };
    let (width, height) = img.dimensions();
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png)?;
    Ok(Thumbnail {
        width,
        height,
        png: out.into_inner(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::DirRoot;
    use crate::testkit::{encode_json_chunk, obfuscate, unique_tmp_dir, write_payload, TEST_SEED};
    use image::{Rgb, RgbImage};
    use serde_json::json;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    /// 写出 place_images_index.json + 指定名字的 payload
    fn write_images(dir: &std::path::Path, payload_name: Option<&str>, blobs: &[(&str, Vec<u8>)]) {
        let chunks: Vec<Vec<u8>> = blobs.iter().map(|(_, b)| b.clone()).collect();
        let file = payload_name.unwrap_or(crate::config::DEFAULT_IMAGE_PAYLOAD_FILE);
        let spans = write_payload(&dir.join(file), &chunks);
        let mut images = serde_json::Map::new();
        for ((id, blob), (off, len)) in blobs.iter().zip(spans) {
            images.insert(
                id.to_string(),
                json!({
                    "image_payload_offset": off,
                    "image_payload_length": len,
                    "image_payload_sha256": hex::encode(Sha256::digest(blob)),
                }),
            );
        }
        let mut index = json!({ "version": 1, "images": images });
        if let Some(name) = payload_name {
            index["payload_file"] = json!(name);
        }
        std::fs::write(
            dir.join(crate::config::DEFAULT_IMAGE_INDEX_FILE),
            serde_json::to_vec(&index).unwrap(),
        )
        .unwrap();
    }

    fn open(dir: &std::path::Path) -> ImageStore {
        let resolver = ResourceResolver::new(vec![Box::new(DirRoot::new(dir))]);
        ImageStore::open(&resolver, &StoreConfig::default())
    }

    #[test]
    fn thumbnail_respects_max_pixel() {
        let dir = unique_tmp_dir("img");
        write_images(
            &dir,
            None,
            &[("p1", encode_json_chunk(&png_bytes(600, 300), TEST_SEED))],
        );
        let store = open(&dir);
        assert!(store.is_available());

        let t = store.load_place_image("p1", 300).unwrap();
        assert_eq!((t.width, t.height), (300, 150));
        let back = image::load_from_memory(&t.png).unwrap();
        assert_eq!(back.dimensions(), (300, 150));

        // 下限 256
        let t = store.load_place_image("p1", 10).unwrap();
        assert_eq!((t.width, t.height), (256, 128));

        // 不超过就原样
        let t = store.load_place_image("p1", 1000).unwrap();
        assert_eq!((t.width, t.height), (600, 300));
        assert_eq!(store.stats.snapshot().images_served, 3);
    }

    #[test]
    fn declared_payload_name_is_used() {
        let dir = unique_tmp_dir("img-named");
        write_images(
            &dir,
            Some("images_v2.bin"),
            &[("p1", encode_json_chunk(&png_bytes(40, 20), TEST_SEED))],
        );
        let store = open(&dir);
        let image = store.image_ref_for("p1").unwrap().clone();
        assert_eq!(image.offset, 0);
        let t = store.load_image(&image, 512).unwrap();
        assert_eq!((t.width, t.height), (40, 20));
        assert!(store.image_ref_for("nope").is_none());
    }

    #[test]
    fn missing_payload_yields_none() {
        let dir = unique_tmp_dir("img-missing");
        let store = open(&dir);
        assert!(!store.is_available());
        let image = ImageRef {
            offset: 0,
            length: 10,
            sha256: None,
        };
        assert!(store.load_image(&image, 512).is_none());
    }

    #[test]
    fn corrupt_blob_yields_none() {
        let dir = unique_tmp_dir("img-corrupt");
        write_images(
            &dir,
            None,
            &[
                ("junk", obfuscate(b"definitely not zlib", TEST_SEED)),
                ("notimg", encode_json_chunk(b"plain text, not an image", TEST_SEED)),
                ("ok", encode_json_chunk(&png_bytes(8, 8), TEST_SEED)),
            ],
        );
        let store = open(&dir);
        assert!(store.load_place_image("junk", 512).is_none());
        assert!(store.load_place_image("notimg", 512).is_none());
        assert!(store.load_place_image("ok", 512).is_some());

        let past_end = ImageRef {
            offset: 1 << 20,
            length: 16,
            sha256: None,
        };
        assert!(store.load_image(&past_end, 512).is_none());
    }

    #[test]
    fn sha256_checked_when_enabled() {
        let dir = unique_tmp_dir("img-sha");
        write_images(
            &dir,
            None,
            &[("p1", encode_json_chunk(&png_bytes(8, 8), TEST_SEED))],
        );
        let resolver = ResourceResolver::new(vec![Box::new(DirRoot::new(&dir))]);
        let cfg = StoreConfig {
            verify_payload_sha256: true,
            ..StoreConfig::default()
        };
        let store = ImageStore::open(&resolver, &cfg);
        let mut image = store.image_ref_for("p1").unwrap().clone();
        assert!(store.load_image(&image, 512).is_some());
        image.sha256 = Some("00".to_string());
        assert!(store.load_image(&image, 512).is_none());
    }
}
