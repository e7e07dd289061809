//! Skybox and indirect-light descriptions and their asynchronous loading.
//!
//! Texture-backed variants are read and validated on the [`Strand`]; the
//! caller polls the returned [`PendingTask`] from the frame loop.

use std::path::{Path, PathBuf};

use lumen_core::Color;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SceneConfig;
use crate::error::LoadError;
use crate::strand::{PendingTask, Strand};

const KTX_MAGIC: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const HDR_MAGICS: [&[u8]; 2] = [b"#?RADIANCE", b"#?RGBE"];

/// Container format of an environment texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetFormat {
    Ktx,
    Hdr,
}

impl AssetFormat {
    pub fn name(self) -> &'static str {
        match self {
            AssetFormat::Ktx => "KTX",
            AssetFormat::Hdr => "HDR",
        }
    }

    /// Whether `bytes` starts with this format's signature.
    pub fn matches(self, bytes: &[u8]) -> bool {
        match self {
            AssetFormat::Ktx => bytes.starts_with(&KTX_MAGIC),
            AssetFormat::Hdr => HDR_MAGICS.iter().any(|magic| bytes.starts_with(magic)),
        }
    }
}

/// A validated environment texture, still encoded.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentAsset {
    pub path: PathBuf,
    pub format: AssetFormat,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Skybox {
    Color(Color),
    Ktx(PathBuf),
    Hdr(PathBuf),
}

impl Default for Skybox {
    fn default() -> Self {
        Skybox::Color(Color::BLACK)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedSkybox {
    Color(Color),
    Texture(EnvironmentAsset),
}

impl Skybox {
    /// Load the skybox on the strand. Solid colors resolve without touching disk.
    pub fn load(
        &self,
        strand: &Strand,
        config: &SceneConfig,
    ) -> PendingTask<Result<LoadedSkybox, LoadError>> {
        match self {
            Skybox::Color(color) => {
                let color = *color;
                strand.post(async move { Ok(LoadedSkybox::Color(color)) })
            }
            Skybox::Ktx(path) => {
                let path = config.resolve_asset(path);
                strand.post(async move {
                    read_asset(path, AssetFormat::Ktx).await.map(LoadedSkybox::Texture)
                })
            }
            Skybox::Hdr(path) => {
                let path = config.resolve_asset(path);
                strand.post(async move {
                    read_asset(path, AssetFormat::Hdr).await.map(LoadedSkybox::Texture)
                })
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum IndirectLight {
    Ktx(PathBuf),
    Hdr(PathBuf),
    /// Engine-provided neutral lighting
    #[default]
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadedIndirectLight {
    Texture(EnvironmentAsset),
    Default,
}

impl IndirectLight {
    pub fn load(
        &self,
        strand: &Strand,
        config: &SceneConfig,
    ) -> PendingTask<Result<LoadedIndirectLight, LoadError>> {
        let source = match self {
            IndirectLight::Ktx(path) => Some((config.resolve_asset(path), AssetFormat::Ktx)),
            IndirectLight::Hdr(path) => Some((config.resolve_asset(path), AssetFormat::Hdr)),
            IndirectLight::Default => None,
        };
        strand.post(async move {
            match source {
                Some((path, format)) => read_asset(path, format)
                    .await
                    .map(LoadedIndirectLight::Texture),
                None => Ok(LoadedIndirectLight::Default),
            }
        })
    }
}

/// Read a texture file and check its signature.
pub async fn read_asset(path: PathBuf, format: AssetFormat) -> Result<EnvironmentAsset, LoadError> {
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => LoadError::NotFound(path.clone()),
        _ => LoadError::Io(path.clone(), e),
    })?;
    validate(&path, format, &bytes)?;
    info!("Loaded {} environment asset {:?} ({} bytes)", format.name(), path, bytes.len());
    Ok(EnvironmentAsset {
        path,
        format,
        bytes,
    })
}

fn validate(path: &Path, format: AssetFormat, bytes: &[u8]) -> Result<(), LoadError> {
    if format.matches(bytes) {
        return Ok(());
    }
    debug!("{:?} has no {} signature", path, format.name());
    Err(LoadError::BadHeader(path.to_path_buf(), format.name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lumen-env-{}-{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn config_for(dir: &Path) -> SceneConfig {
        SceneConfig {
            asset_root: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn signatures() {
        let mut ktx = KTX_MAGIC.to_vec();
        ktx.extend_from_slice(&[0; 8]);
        assert!(AssetFormat::Ktx.matches(&ktx));
        assert!(!AssetFormat::Hdr.matches(&ktx));
        assert!(AssetFormat::Hdr.matches(b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n"));
        assert!(AssetFormat::Hdr.matches(b"#?RGBE\n"));
        assert!(!AssetFormat::Ktx.matches(b"KTX"));
    }

    #[test]
    fn color_skybox_resolves_without_io() {
        let strand = Strand::new(1).unwrap();
        let loaded = Skybox::Color(Color::WHITE)
            .load(&strand, &SceneConfig::default())
            .wait()
            .unwrap()
            .unwrap();
        assert_eq!(loaded, LoadedSkybox::Color(Color::WHITE));
    }

    #[test]
    fn hdr_skybox_is_read_and_validated() {
        let dir = temp_dir("hdr");
        fs::write(dir.join("sky.hdr"), b"#?RADIANCE\n\n-Y 1 +X 1\n").unwrap();
        fs::write(dir.join("broken.hdr"), b"P6\n1 1\n255\n").unwrap();
        let strand = Strand::new(1).unwrap();
        let config = config_for(&dir);

        let loaded = Skybox::Hdr("sky.hdr".into())
            .load(&strand, &config)
            .wait()
            .unwrap()
            .unwrap();
        let LoadedSkybox::Texture(asset) = loaded else {
            panic!("expected a texture");
        };
        assert_eq!(asset.format, AssetFormat::Hdr);
        assert_eq!(asset.path, dir.join("sky.hdr"));

        let broken = Skybox::Hdr("broken.hdr".into())
            .load(&strand, &config)
            .wait()
            .unwrap();
        assert!(matches!(broken, Err(LoadError::BadHeader(_, "HDR"))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn indirect_light_variants() {
        let dir = temp_dir("ibl");
        let mut ktx = KTX_MAGIC.to_vec();
        ktx.extend_from_slice(&[1, 2, 3, 4]);
        fs::write(dir.join("ibl.ktx"), &ktx).unwrap();
        let strand = Strand::new(1).unwrap();
        let config = config_for(&dir);

        let default = IndirectLight::Default.load(&strand, &config).wait().unwrap();
        assert_eq!(default.unwrap(), LoadedIndirectLight::Default);

        let ktx_light = IndirectLight::Ktx("ibl.ktx".into())
            .load(&strand, &config)
            .wait()
            .unwrap()
            .unwrap();
        assert!(matches!(ktx_light, LoadedIndirectLight::Texture(ref a) if a.bytes == ktx));

        let missing = IndirectLight::Ktx("missing.ktx".into())
            .load(&strand, &config)
            .wait()
            .unwrap();
        assert!(matches!(missing, Err(LoadError::NotFound(_))));
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn descriptions_deserialize_from_json() {
        let skybox: Skybox =
            serde_json::from_str(r#"{"kind":"ktx","value":"sky.ktx"}"#).unwrap();
        assert_eq!(skybox, Skybox::Ktx("sky.ktx".into()));
        let light: IndirectLight = serde_json::from_str(r#"{"kind":"default"}"#).unwrap();
        assert_eq!(light, IndirectLight::Default);
    }
}
