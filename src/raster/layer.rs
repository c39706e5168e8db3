//! Raster layers: one value and one validity flag per cell.

use serde::{Deserialize, Serialize};

use crate::frame::PixelValue;

/// Color model of the orthomosaic layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Grayscale,
    Rgb,
}

impl ColorMode {
    /// Convert a sampled pixel into this color model.
    pub fn convert(self, value: PixelValue) -> PixelValue {
        match self {
            ColorMode::Grayscale => PixelValue::Gray(value.luma()),
            ColorMode::Rgb => PixelValue::Rgb(value.rgb()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    Scalar(Vec<f64>),
    Gray(Vec<u8>),
    Rgb(Vec<[u8; 3]>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    data: LayerData,
    valid: Vec<bool>,
}

impl Layer {
    /// Scalar layer with every cell invalid (zero).
    pub fn scalar(len: usize) -> Self {
        Self {
            data: LayerData::Scalar(vec![0.0; len]),
            valid: vec![false; len],
        }
    }

    /// Color layer with every cell invalid (black).
    pub fn color(mode: ColorMode, len: usize) -> Self {
        let data = match mode {
            ColorMode::Grayscale => LayerData::Gray(vec![0; len]),
            ColorMode::Rgb => LayerData::Rgb(vec![[0; 3]; len]),
        };
        Self {
            data,
            valid: vec![false; len],
        }
    }

    pub fn len(&self) -> usize {
        self.valid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valid.is_empty()
    }

    pub fn data(&self) -> &LayerData {
        &self.data
    }

    pub fn validity(&self) -> &[bool] {
        &self.valid
    }

    pub fn is_valid(&self, index: usize) -> bool {
        self.valid.get(index).copied().unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Scalar value of a valid cell.
    pub fn scalar_at(&self, index: usize) -> Option<f64> {
        match &self.data {
            LayerData::Scalar(values) if self.is_valid(index) => values.get(index).copied(),
            _ => None,
        }
    }

    /// Color value of a valid cell.
    pub fn color_at(&self, index: usize) -> Option<PixelValue> {
        if !self.is_valid(index) {
            return None;
        }
        match &self.data {
            LayerData::Gray(values) => values.get(index).map(|&v| PixelValue::Gray(v)),
            LayerData::Rgb(values) => values.get(index).map(|&c| PixelValue::Rgb(c)),
            LayerData::Scalar(_) => None,
        }
    }

    /// Write a scalar and mark the cell valid. Returns false (no-op) for
    /// indices outside the layer or non-scalar layers.
    pub fn set_scalar(&mut self, index: usize, value: f64) -> bool {
        match &mut self.data {
            LayerData::Scalar(values) if index < values.len() => {
                values[index] = value;
                self.valid[index] = true;
                true
            }
            _ => false,
        }
    }

    /// Write a color, converted to the layer's color model, and mark the cell
    /// valid. Returns false (no-op) for indices outside the layer or scalar
    /// layers.
    pub fn set_color(&mut self, index: usize, value: PixelValue) -> bool {
        if index >= self.valid.len() {
            return false;
        }
        match &mut self.data {
            LayerData::Gray(values) => values[index] = value.luma(),
            LayerData::Rgb(values) => values[index] = value.rgb(),
            LayerData::Scalar(_) => return false,
        }
        self.valid[index] = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_layers_are_invalid() {
        let scalar = Layer::scalar(4);
        let color = Layer::color(ColorMode::Rgb, 4);
        assert_eq!(scalar.valid_count(), 0);
        assert_eq!(color.valid_count(), 0);
        assert_eq!(scalar.scalar_at(0), None);
        assert_eq!(color.color_at(3), None);
    }

    #[test]
    fn test_out_of_range_writes_are_noops() {
        let mut scalar = Layer::scalar(2);
        assert!(!scalar.set_scalar(2, 1.0));
        assert!(!scalar.set_color(0, PixelValue::Gray(1)));
        assert_eq!(scalar.valid_count(), 0);
    }

    #[test]
    fn test_gray_layer_converts_rgb_input() {
        let mut layer = Layer::color(ColorMode::Grayscale, 1);
        assert!(layer.set_color(0, PixelValue::Rgb([255, 255, 255])));
        assert_eq!(layer.color_at(0), Some(PixelValue::Gray(255)));
    }

    #[test]
    fn test_color_mode_convert() {
        assert_eq!(
            ColorMode::Rgb.convert(PixelValue::Gray(9)),
            PixelValue::Rgb([9, 9, 9])
        );
        assert_eq!(
            ColorMode::Grayscale.convert(PixelValue::Gray(9)),
            PixelValue::Gray(9)
        );
    }
}
