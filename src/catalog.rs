use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::EraserError;

/// Identity of one of the fixed background-removal models.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Rmbg,
    Modnet,
}

/// Static description of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelInfo {
    pub kind: ModelKind,
    pub name: &'static str,
    /// Hugging Face repository the weights are fetched from.
    pub remote: &'static str,
    pub description: &'static str,
    pub requires_accelerated: bool,
}

const RMBG: ModelInfo = ModelInfo {
    kind: ModelKind::Rmbg,
    name: "RMBG-1.4",
    remote: "briaai/RMBG-1.4",
    description: "Best accuracy, works everywhere",
    requires_accelerated: false,
};

const MODNET: ModelInfo = ModelInfo {
    kind: ModelKind::Modnet,
    name: "MODNet",
    remote: "Xenova/modnet",
    description: "Smaller, faster with WebGPU",
    requires_accelerated: true,
};

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::Rmbg, ModelKind::Modnet];

    pub const fn info(self) -> &'static ModelInfo {
        match self {
            ModelKind::Rmbg => &RMBG,
            ModelKind::Modnet => &MODNET,
        }
    }

    pub const fn id(self) -> &'static str {
        match self {
            ModelKind::Rmbg => "rmbg",
            ModelKind::Modnet => "modnet",
        }
    }

    /// Whether this model can be selected on a machine with or without accelerated compute.
    pub const fn is_available(self, accelerated: bool) -> bool {
        !self.info().requires_accelerated || accelerated
    }

    /// Catalog entries selectable in the given environment, in catalog order.
    pub fn available_models(accelerated: bool) -> Vec<&'static ModelInfo> {
        Self::ALL
            .iter()
            .filter(|kind| kind.is_available(accelerated))
            .map(|kind| kind.info())
            .collect()
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelKind {
    type Err = EraserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rmbg" => Ok(ModelKind::Rmbg),
            "modnet" => Ok(ModelKind::Modnet),
            other => Err(EraserError::validation(
                "model",
                format!("`{other}` is not one of rmbg, modnet"),
            )),
        }
    }
}

/// Compute device a model is constructed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Accelerated,
    Portable,
}

impl Device {
    pub const fn select(accelerated_available: bool) -> Self {
        if accelerated_available {
            Device::Accelerated
        } else {
            Device::Portable
        }
    }
}
