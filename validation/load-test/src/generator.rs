//! Tile grid enumeration and URL generation.

use crate::config::BenchConfig;
use serde::Serialize;
use std::fmt;

/// Address of one tile in a Deep Zoom pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TileCoord {
    pub level: u32,
    pub col: u32,
    pub row: u32,
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}_{}", self.level, self.col, self.row)
    }
}

/// Rectangular grid of tiles at a single level, anchored at (0, 0).
#[derive(Debug, Clone)]
pub struct TileGrid {
    base_url: String,
    slide: String,
    level: u32,
    col_range: u32,
    row_range: u32,
}

impl TileGrid {
    /// Create a grid from the batch configuration.
    pub fn new(config: &BenchConfig) -> Self {
        Self {
            base_url: config.base().to_string(),
            slide: config.slide.clone(),
            level: config.level,
            col_range: config.col_range,
            row_range: config.row_range,
        }
    }

    pub fn len(&self) -> usize {
        self.col_range as usize * self.row_range as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate every coordinate once, row-major (all columns of row 0 first).
    pub fn coords(&self) -> impl Iterator<Item = TileCoord> + '_ {
        (0..self.row_range).flat_map(move |row| {
            (0..self.col_range).map(move |col| TileCoord {
                level: self.level,
                col,
                row,
            })
        })
    }

    /// URL of the slide's DZI descriptor.
    pub fn descriptor_url(&self) -> String {
        format!("{}/{}.dzi", self.base_url, self.slide)
    }

    /// URL of a single JPEG tile.
    pub fn tile_url(&self, coord: TileCoord) -> String {
        format!(
            "{}/{}_files/{}/{}_{}.jpg",
            self.base_url, self.slide, coord.level, coord.col, coord.row
        )
    }
}
