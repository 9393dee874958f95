use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid renderer config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid renderer config: {0}")]
    Invalid(String),
}

/// Colour/depth/stencil sizes requested from `eglChooseConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SurfaceFormat {
    pub red_bits: i32,
    pub green_bits: i32,
    pub blue_bits: i32,
    pub alpha_bits: i32,
    pub depth_bits: i32,
    pub stencil_bits: i32,
}

impl Default for SurfaceFormat {
    fn default() -> Self {
        Self {
            red_bits: 8,
            green_bits: 8,
            blue_bits: 8,
            alpha_bits: 8,
            depth_bits: 0,
            stencil_bits: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RendererConfig {
    #[serde(default = "default_gles_version")]
    pub gles_version: i32,
    #[serde(default)]
    pub format: SurfaceFormat,
    #[serde(default = "default_pbuffer_size")]
    pub pbuffer_width: i32,
    #[serde(default = "default_pbuffer_size")]
    pub pbuffer_height: i32,
    /// Texture unit the decoder texture is sampled from.
    #[serde(default)]
    pub sampler_unit: u32,
    /// Decoder output is stored bottom-up; flip it when copying.
    #[serde(default = "default_true")]
    pub flip_vertical: bool,
}

fn default_gles_version() -> i32 {
    2
}

fn default_pbuffer_size() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            gles_version: default_gles_version(),
            format: SurfaceFormat::default(),
            pbuffer_width: default_pbuffer_size(),
            pbuffer_height: default_pbuffer_size(),
            sampler_unit: 0,
            flip_vertical: true,
        }
    }
}

impl RendererConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: RendererConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gles_version < 2 {
            return Err(ConfigError::Invalid(format!(
                "gles-version {} is below 2; the copy shader needs GLES2",
                self.gles_version
            )));
        }
        if self.pbuffer_width < 1 || self.pbuffer_height < 1 {
            return Err(ConfigError::Invalid(format!(
                "pbuffer must be at least 1x1, got {}x{}",
                self.pbuffer_width, self.pbuffer_height
            )));
        }
        let f = &self.format;
        let bits = [
            f.red_bits,
            f.green_bits,
            f.blue_bits,
            f.alpha_bits,
            f.depth_bits,
            f.stencil_bits,
        ];
        if bits.iter().any(|b| *b < 0) {
            return Err(ConfigError::Invalid("negative surface format size".into()));
        }
        if self.sampler_unit > 31 {
            return Err(ConfigError::Invalid(format!(
                "sampler-unit {} out of range",
                self.sampler_unit
            )));
        }
        Ok(())
    }
}
