//! Board descriptions
//!
//! A board tells which controllers a machine has, which flash chip sits on
//! which chip-select and where DRAM lives. Boards are described in TOML:
//!
//! ```toml
//! [board]
//! name = "palmetto"
//! sdram_base = 0x40000000
//! sdram_size = "64 MiB"
//!
//! [[controller]]
//! variant = "fmc"
//! num_cs = 1
//!
//! [[controller.flash]]
//! cs = 0
//! chip = "n25q256a"
//! image = "bmc.bin"
//! ```
//!
//! Image paths are relative to the board file.

use std::fs;
use std::path::{Path, PathBuf};

use smcemu_core::smc::{find_variant, AspeedSmc, SmcVariant};
use smcemu_dummy::{chip_preset, DummyConfig, DummyFlash};
use thiserror::Error;

/// Default SDRAM base of the AST2400
pub const AST2400_SDRAM_BASE: u32 = 0x4000_0000;

const DEFAULT_SDRAM_SIZE: u32 = 64 * 1024 * 1024;

/// Board description errors
#[derive(Debug, Error)]
pub enum BoardError {
    /// File could not be read
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML
    #[error("Invalid board description: {0}")]
    Parse(#[from] toml::de::Error),

    /// Malformed size string
    #[error("Invalid size '{0}'")]
    InvalidSize(String),

    /// Variant name not known
    #[error("Unknown controller variant '{0}'")]
    UnknownVariant(String),

    /// Chip preset not known
    #[error("Unknown flash chip '{0}'")]
    UnknownChip(String),

    /// The board has no such controller
    #[error("Board '{board}' has no '{controller}' controller")]
    NoController { board: String, controller: String },

    /// Flash could not be wired
    #[error("{variant}: {source}")]
    Wiring {
        variant: &'static str,
        #[source]
        source: smcemu_core::Error,
    },
}

/// TOML board file structure
#[derive(Debug, serde::Deserialize)]
struct TomlBoardFile {
    board: Option<TomlBoardMeta>,
    #[serde(default)]
    controller: Vec<TomlController>,
}

/// Board metadata
#[derive(Debug, serde::Deserialize)]
struct TomlBoardMeta {
    name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_hex_u32")]
    sdram_base: Option<u32>,
    sdram_size: Option<String>,
}

/// Controller definition in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlController {
    variant: String,
    num_cs: Option<usize>,
    #[serde(default)]
    flash: Vec<TomlFlash>,
}

/// Flash chip definition in TOML
#[derive(Debug, serde::Deserialize)]
struct TomlFlash {
    #[serde(default)]
    cs: usize,
    chip: String,
    image: Option<PathBuf>,
}

/// Deserialize a u32 that can be hex (0x...) or decimal
fn deserialize_opt_hex_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    // Try to deserialize as a number first, then as a string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match Option::<HexOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(HexOrInt::Int(n)) => Ok(Some(n)),
        Some(HexOrInt::Str(s)) => parse_number(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
fn parse_number(s: &str) -> Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

/// Parse a size string like "64 MiB" or "4096"
fn parse_size(s: &str) -> Result<u32, BoardError> {
    let invalid = || BoardError::InvalidSize(s.to_string());
    let trimmed = s.trim();

    if let Ok(n) = parse_number(trimmed) {
        return Ok(n);
    }

    let lower = trimmed.to_lowercase();
    let (num_str, multiplier) = if let Some(n) = lower.strip_suffix("mib") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("mb") {
        (n.trim(), 1024 * 1024)
    } else if let Some(n) = lower.strip_suffix("kib") {
        (n.trim(), 1024)
    } else if let Some(n) = lower.strip_suffix("kb") {
        (n.trim(), 1024)
    } else {
        return Err(invalid());
    };

    let num: u32 = num_str.parse().map_err(|_| invalid())?;
    num.checked_mul(multiplier).ok_or_else(invalid)
}

/// One flash chip on a chip-select
#[derive(Debug, Clone)]
pub struct FlashConfig {
    /// Chip-select
    pub cs: usize,
    /// Chip preset name
    pub chip: String,
    /// Chip geometry and IDs
    pub config: DummyConfig,
    /// Initial contents
    pub image: Option<PathBuf>,
}

/// One controller of the board
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Controller variant
    pub variant: &'static SmcVariant,
    /// Number of chip-selects wired
    pub num_cs: usize,
    /// Flash chips
    pub flash: Vec<FlashConfig>,
}

/// A machine description
#[derive(Debug, Clone)]
pub struct Board {
    /// Board name
    pub name: String,
    /// DRAM base address
    pub sdram_base: u32,
    /// DRAM size in bytes
    pub sdram_size: u32,
    /// Controllers
    pub controllers: Vec<ControllerConfig>,
}

fn flash(cs: usize, chip: &str) -> Result<FlashConfig, BoardError> {
    let config = chip_preset(chip).ok_or_else(|| BoardError::UnknownChip(chip.to_string()))?;
    Ok(FlashConfig {
        cs,
        chip: chip.to_string(),
        config,
        image: None,
    })
}

fn variant(name: &str) -> Result<&'static SmcVariant, BoardError> {
    find_variant(name).map_err(|_| BoardError::UnknownVariant(name.to_string()))
}

impl Board {
    /// AST2400 palmetto: boot flash on the FMC, host flash on the SPI
    /// controller
    pub fn palmetto() -> Result<Self, BoardError> {
        Ok(Self {
            name: "palmetto".to_string(),
            sdram_base: AST2400_SDRAM_BASE,
            sdram_size: DEFAULT_SDRAM_SIZE,
            controllers: vec![
                ControllerConfig {
                    variant: variant("fmc")?,
                    num_cs: 1,
                    flash: vec![flash(0, "n25q256a")?],
                },
                ControllerConfig {
                    variant: variant("spi")?,
                    num_cs: 1,
                    flash: vec![flash(0, "mx25l25635e")?],
                },
            ],
        })
    }

    /// A board with a single controller of the given variant and one
    /// flash chip on CS0
    pub fn single(variant_name: &str) -> Result<Self, BoardError> {
        let variant = variant(variant_name)?;
        Ok(Self {
            name: variant.name.to_string(),
            sdram_base: AST2400_SDRAM_BASE,
            sdram_size: DEFAULT_SDRAM_SIZE,
            controllers: vec![ControllerConfig {
                variant,
                num_cs: 1,
                flash: vec![flash(0, "n25q256a")?],
            }],
        })
    }

    /// Load a board from a TOML file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, BoardError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| BoardError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml_str(&content, base_dir)
    }

    /// Parse a board from a TOML string, image paths relative to `base_dir`
    pub fn from_toml_str(content: &str, base_dir: &Path) -> Result<Self, BoardError> {
        let file: TomlBoardFile = toml::from_str(content)?;

        let mut board = Self {
            name: "custom".to_string(),
            sdram_base: AST2400_SDRAM_BASE,
            sdram_size: DEFAULT_SDRAM_SIZE,
            controllers: Vec::new(),
        };

        if let Some(meta) = file.board {
            if let Some(name) = meta.name {
                board.name = name;
            }
            if let Some(base) = meta.sdram_base {
                board.sdram_base = base;
            }
            if let Some(size) = meta.sdram_size {
                board.sdram_size = parse_size(&size)?;
            }
        }

        for ctrl in file.controller {
            let variant = variant(&ctrl.variant)?;
            let mut flashes = Vec::new();
            for f in ctrl.flash {
                let mut config = flash(f.cs, &f.chip)?;
                config.image = f.image.map(|p| base_dir.join(p));
                flashes.push(config);
            }
            let num_cs = ctrl
                .num_cs
                .unwrap_or_else(|| flashes.iter().map(|f| f.cs + 1).max().unwrap_or(1));
            board.controllers.push(ControllerConfig {
                variant,
                num_cs,
                flash: flashes,
            });
        }

        Ok(board)
    }

    /// Find a controller by variant name
    pub fn controller(&self, name: &str) -> Result<&ControllerConfig, BoardError> {
        let wanted = variant(name)?;
        self.controllers
            .iter()
            .find(|c| std::ptr::eq(c.variant, wanted))
            .ok_or_else(|| BoardError::NoController {
                board: self.name.clone(),
                controller: wanted.name.to_string(),
            })
    }

    /// Build a controller of this board
    pub fn build(&self, name: &str) -> Result<AspeedSmc, BoardError> {
        self.controller(name)?.build(self.sdram_base)
    }
}

impl ControllerConfig {
    /// Instantiate the controller and wire its flash chips
    pub fn build(&self, sdram_base: u32) -> Result<AspeedSmc, BoardError> {
        let mut smc = AspeedSmc::with_sdram_base(self.variant, self.num_cs, sdram_base);

        for f in &self.flash {
            let chip = match &f.image {
                Some(path) => {
                    let data = fs::read(path).map_err(|source| BoardError::Io {
                        path: path.clone(),
                        source,
                    })?;
                    if data.len() > f.config.size {
                        log::warn!(
                            "{}: image {} is larger than the chip, truncating",
                            f.chip,
                            path.display()
                        );
                    }
                    DummyFlash::with_data(f.config.clone(), &data)
                }
                None => DummyFlash::new(f.config.clone()),
            };
            smc.attach_flash(f.cs, Box::new(chip))
                .map_err(|source| BoardError::Wiring {
                    variant: self.variant.name,
                    source,
                })?;
            log::debug!("{}: {} on CS{}", self.variant.name, f.chip, f.cs);
        }

        Ok(smc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("0x1000").unwrap(), 4096);
        assert_eq!(parse_size("4 KiB").unwrap(), 4096);
        assert_eq!(parse_size("64MiB").unwrap(), 64 * 1024 * 1024);
        assert!(matches!(parse_size("lots"), Err(BoardError::InvalidSize(_))));
        assert!(parse_size("8192 MiB").is_err());
    }

    #[test]
    fn test_palmetto() {
        let board = Board::palmetto().unwrap();
        let fmc = board.build("fmc").unwrap();
        assert!(fmc.has_flash(0));
        assert_eq!(fmc.sdram_base(), 0x4000_0000);

        let spi = board.controller("aspeed.smc.spi").unwrap();
        assert_eq!(spi.flash[0].config.manufacturer_id, 0xC2);

        assert!(matches!(
            board.controller("ast2500-fmc"),
            Err(BoardError::NoController { .. })
        ));
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[board]
name = "test"
sdram_base = "0x80000000"
sdram_size = "16 MiB"

[[controller]]
variant = "ast2500-fmc"

[[controller.flash]]
cs = 1
chip = "w25q128fv"

[[controller]]
variant = "aspeed.smc.ast2500-spi1"
num_cs = 2
"#;
        let board = Board::from_toml_str(toml, Path::new(".")).unwrap();
        assert_eq!(board.name, "test");
        assert_eq!(board.sdram_base, 0x8000_0000);
        assert_eq!(board.sdram_size, 16 * 1024 * 1024);
        assert_eq!(board.controllers.len(), 2);
        // inferred from the highest chip-select
        assert_eq!(board.controllers[0].num_cs, 2);
        assert_eq!(board.controllers[1].num_cs, 2);

        let fmc = board.build("ast2500-fmc").unwrap();
        assert!(!fmc.has_flash(0));
        assert!(fmc.has_flash(1));
    }

    #[test]
    fn test_bad_descriptions() {
        let err = Board::from_toml_str("[[controller]]\nvariant = \"ast9999\"\n", Path::new("."));
        assert!(matches!(err, Err(BoardError::UnknownVariant(_))));

        let err = Board::from_toml_str(
            "[[controller]]\nvariant = \"fmc\"\n[[controller.flash]]\nchip = \"nope\"\n",
            Path::new("."),
        );
        assert!(matches!(err, Err(BoardError::UnknownChip(_))));

        // CS1 is not wired
        let board = Board::from_toml_str(
            "[[controller]]\nvariant = \"fmc\"\nnum_cs = 1\n[[controller.flash]]\ncs = 1\nchip = \"n25q256a\"\n",
            Path::new("."),
        )
        .unwrap();
        assert!(matches!(board.build("fmc"), Err(BoardError::Wiring { .. })));
    }

    #[test]
    fn test_image_relative_to_board_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = std::fs::File::create(dir.path().join("boot.bin")).unwrap();
        image.write_all(&[0xEA, 0x00, 0x00, 0x12]).unwrap();

        let board_path = dir.path().join("board.toml");
        std::fs::write(
            &board_path,
            "[[controller]]\nvariant = \"fmc\"\n[[controller.flash]]\nchip = \"n25q256a\"\nimage = \"boot.bin\"\n",
        )
        .unwrap();

        let board = Board::from_toml_file(&board_path).unwrap();
        let mut fmc = board.build("fmc").unwrap();
        assert_eq!(fmc.flash_read(0, 4), 0x1200_00EA);

        let missing = Board::from_toml_file(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(BoardError::Io { .. })));
    }
}
