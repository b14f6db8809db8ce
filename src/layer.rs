//! Vector geometry layers
//!
//! A [`GeometryLayer`] is the in-memory form of a point or polygon shapefile:
//! `geo` geometries plus the attribute table. Layers are read-only inputs of
//! the statistics stage.

use crate::errors::{PipelineError, Result};
use crate::naming::GeometryKind;
use crate::raster::Extent;
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Point, Polygon};
use shapefile::dbase::FieldValue;
use shapefile::{PolygonRing, Reader, Shape};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};

/// One attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Number(f64),
    Integer(i64),
    Bool(bool),
    Null,
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Null => Ok(()),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<FieldValue> for AttrValue {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::Character(Some(s)) => Self::Text(s.trim().to_string()),
            FieldValue::Memo(s) => Self::Text(s),
            FieldValue::Numeric(Some(v)) | FieldValue::Double(v) | FieldValue::Currency(v) => {
                if v.fract() == 0.0 && v.abs() < 9.0e15 {
                    Self::Integer(v as i64)
                } else {
                    Self::Number(v)
                }
            }
            FieldValue::Float(Some(v)) => Self::Number(f64::from(v)),
            FieldValue::Integer(v) => Self::Integer(i64::from(v)),
            FieldValue::Logical(Some(v)) => Self::Bool(v),
            FieldValue::Date(Some(d)) => Self::Text(format!(
                "{:04}-{:02}-{:02}",
                d.year(),
                d.month(),
                d.day()
            )),
            _ => Self::Null,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Point<f64>),
    Polygon(MultiPolygon<f64>),
}

impl Geometry {
    #[must_use]
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) => GeometryKind::Point,
            Self::Polygon(_) => GeometryKind::Polygon,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry,
    pub attributes: BTreeMap<String, AttrValue>,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    /// Attribute value, `Null` when the feature does not carry it
    #[must_use]
    pub fn attribute(&self, name: &str) -> &AttrValue {
        self.attributes.get(name).unwrap_or(&AttrValue::Null)
    }
}

/// A named collection of features of one geometry kind
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryLayer {
    pub name: String,
    pub kind: GeometryKind,
    /// Attribute field names, sorted
    pub fields: Vec<String>,
    pub features: Vec<Feature>,
}

impl GeometryLayer {
    pub fn new(name: impl Into<String>, kind: GeometryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fields: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Adds a feature; its geometry must match the layer kind.
    pub fn push(&mut self, feature: Feature) -> Result<()> {
        if feature.geometry.kind() != self.kind {
            return Err(PipelineError::Geometry(format!(
                "{} feature added to {} layer '{}'",
                feature.geometry.kind(),
                self.kind,
                self.name
            )));
        }
        for field in feature.attributes.keys() {
            if let Err(pos) = self.fields.binary_search(field) {
                self.fields.insert(pos, field.clone());
            }
        }
        self.features.push(feature);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.iter().any(|f| f == field)
    }

    pub fn require_field(&self, field: &str) -> Result<()> {
        if self.has_field(field) {
            Ok(())
        } else {
            Err(PipelineError::MissingColumn {
                column: field.to_string(),
                table: format!("layer '{}'", self.name),
            })
        }
    }

    /// Bounding box of every feature, `None` for an empty layer
    #[must_use]
    pub fn extent(&self) -> Option<Extent> {
        let rects = self.features.iter().filter_map(|f| match &f.geometry {
            Geometry::Point(p) => Some(p.bounding_rect()),
            Geometry::Polygon(shape) => shape.bounding_rect(),
        });
        rects.fold(None, |acc: Option<Extent>, rect| {
            let (lo, hi) = (rect.min(), rect.max());
            Some(match acc {
                None => Extent {
                    min_x: lo.x,
                    min_y: lo.y,
                    max_x: hi.x,
                    max_y: hi.y,
                },
                Some(e) => Extent {
                    min_x: e.min_x.min(lo.x),
                    min_y: e.min_y.min(lo.y),
                    max_x: e.max_x.max(hi.x),
                    max_y: e.max_y.max(hi.y),
                },
            })
        })
    }

    /// Loads a point or polygon shapefile.
    ///
    /// Null shapes are skipped with a warning; any other non-matching shape
    /// type is an error.
    pub fn from_shapefile(path: &Path, kind: GeometryKind) -> Result<Self> {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mut layer = Self::new(name, kind);
        let mut reader = Reader::from_path(path)?;

        for (index, result) in reader.iter_shapes_and_records().enumerate() {
            let (shape, record) = result?;
            let geometry = match (shape, kind) {
                (Shape::Point(p), GeometryKind::Point) => Geometry::Point(Point::new(p.x, p.y)),
                (Shape::PointM(p), GeometryKind::Point) => Geometry::Point(Point::new(p.x, p.y)),
                (Shape::PointZ(p), GeometryKind::Point) => Geometry::Point(Point::new(p.x, p.y)),
                (Shape::Polygon(polygon), GeometryKind::Polygon) => {
                    Geometry::Polygon(rings_to_multipolygon(polygon.rings(), |p| (p.x, p.y)))
                }
                (Shape::PolygonM(polygon), GeometryKind::Polygon) => {
                    Geometry::Polygon(rings_to_multipolygon(polygon.rings(), |p| (p.x, p.y)))
                }
                (Shape::PolygonZ(polygon), GeometryKind::Polygon) => {
                    Geometry::Polygon(rings_to_multipolygon(polygon.rings(), |p| (p.x, p.y)))
                }
                (Shape::NullShape, _) => {
                    warn!("{}: feature {} has no geometry, skipped", path.display(), index);
                    continue;
                }
                (other, _) => {
                    return Err(PipelineError::Geometry(format!(
                        "{}: feature {} is a {:?}, expected {}",
                        path.display(),
                        index,
                        other.shapetype(),
                        kind
                    )))
                }
            };

            let mut feature = Feature::new(geometry);
            for (field, value) in record {
                feature.attributes.insert(field, AttrValue::from(value));
            }
            layer.push(feature)?;
        }

        debug!(
            "Loaded {} {} features from {}",
            layer.len(),
            kind,
            path.display()
        );
        Ok(layer)
    }
}

/// Groups shapefile rings into polygons; inner rings belong to the preceding
/// outer ring.
fn rings_to_multipolygon<P>(
    rings: &[PolygonRing<P>],
    xy: impl Fn(&P) -> (f64, f64),
) -> MultiPolygon<f64> {
    let to_line = |points: &[P]| {
        LineString::from(
            points
                .iter()
                .map(|p| {
                    let (x, y) = xy(p);
                    Coord { x, y }
                })
                .collect::<Vec<_>>(),
        )
    };

    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Inner(points) if !polygons.is_empty() => {
                if let Some((_, holes)) = polygons.last_mut() {
                    holes.push(to_line(points));
                }
            }
            PolygonRing::Inner(points) | PolygonRing::Outer(points) => {
                polygons.push((to_line(points), Vec::new()));
            }
        }
    }
    MultiPolygon(
        polygons
            .into_iter()
            .map(|(exterior, holes)| Polygon::new(exterior, holes))
            .collect(),
    )
}
