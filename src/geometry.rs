use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Deserialize, Serialize)]
/// A hole of an irradiation tray
pub struct Hole {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    /// 1-based position of the hole in the tray
    pub index: usize,
}

#[derive(Deserialize)]
struct Row(f64, f64, f64);

/// The ordered holes of an irradiation tray
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    holes: Vec<Hole>,
}

impl Geometry {
    /// Holes at `(x, y, radius)`, numbered from 1 in order
    #[must_use]
    pub fn new(holes: &[(f64, f64, f64)]) -> Self {
        Self {
            holes: holes
                .iter()
                .enumerate()
                .map(|(i, (x, y, radius))| Hole {
                    x: *x,
                    y: *y,
                    radius: *radius,
                    index: i + 1,
                })
                .collect(),
        }
    }

    /// Read a tray from a csv file of `x,y,radius` rows with a header
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a row is malformed
    pub fn from_file(filepath: &Path) -> Result<Self> {
        let file = fs::read(filepath)?;
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(&file[..]);

        let mut holes = vec![];
        for result in rdr.deserialize() {
            let record: Row = result?;
            holes.push((record.0, record.1, record.2));
        }
        Ok(Self::new(&holes))
    }

    /// The hole at 1-based `position`
    ///
    /// # Errors
    /// Returns an error if the tray has no such hole
    pub fn hole(&self, position: usize) -> Result<Hole> {
        position
            .checked_sub(1)
            .and_then(|i| self.holes.get(i))
            .copied()
            .ok_or(Error::MissingHole(position))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.holes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.holes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hole> {
        self.holes.iter()
    }

    /// Largest distance of a hole centre from the tray axis along either coordinate
    #[must_use]
    pub fn extent(&self) -> f64 {
        self.holes
            .iter()
            .map(|hole| hole.x.abs().max(hole.y.abs()))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use crate::Error;

    use super::Geometry;

    #[test]
    fn holes_are_numbered_from_one() {
        let geometry = Geometry::new(&[(0.0, 0.0, 0.1), (1.0, 0.5, 0.1)]);

        let hole = geometry.hole(2).unwrap();
        assert_eq!(hole.index, 2);
        approx::assert_relative_eq!(hole.y, 0.5);
        approx::assert_relative_eq!(geometry.extent(), 1.0);
    }

    #[test]
    fn missing_holes_are_errors() {
        let geometry = Geometry::new(&[(0.0, 0.0, 0.1)]);
        assert!(matches!(geometry.hole(0), Err(Error::MissingHole(0))));
        assert!(matches!(geometry.hole(2), Err(Error::MissingHole(2))));
    }
}
