use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Classification architectures the lab knows how to ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ModelId {
    ResNet50,
    #[default]
    MobileNetV2,
    InceptionV3,
    EfficientNetB0,
}

impl ModelId {
    pub const ALL: [ModelId; 4] = [
        ModelId::ResNet50,
        ModelId::MobileNetV2,
        ModelId::InceptionV3,
        ModelId::EfficientNetB0,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::ResNet50 => "ResNet50",
            ModelId::MobileNetV2 => "MobileNetV2",
            ModelId::InceptionV3 => "InceptionV3",
            ModelId::EfficientNetB0 => "EfficientNetB0",
        }
    }

    /// Maps a missing, blank or unknown identifier to the default model.
    pub fn resolve(raw: Option<&str>) -> ModelId {
        raw.and_then(|value| value.trim().parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown model identifier: {0}")]
pub struct UnknownModel(pub String);

impl FromStr for ModelId {
    type Err = UnknownModel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelId::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| UnknownModel(s.to_string()))
    }
}
