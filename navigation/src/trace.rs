//! GPX input and output: recorded drives for replay, followed routes for export.

use std::io::{Read, Write};

use geo_types::Point;
use gpx::errors::GpxError;
use gpx::{Gpx, GpxVersion, Track, TrackSegment, Waypoint};
use thiserror::Error;

use crate::models::Coordinate;
use crate::route::Route;

const CREATOR: &str = "navigation";

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("invalid GPX: {0}")]
    Gpx(#[from] GpxError),
    #[error("GPX file contains no track points or waypoints")]
    Empty,
}

/// Reads every track point in document order. Files without tracks fall
/// back to their waypoints.
pub fn read_trace<R: Read>(reader: R) -> Result<Vec<Coordinate>, TraceError> {
    let gpx = gpx::read(reader)?;

    let mut points: Vec<Coordinate> = gpx
        .tracks
        .iter()
        .flat_map(|track| track.segments.iter())
        .flat_map(|segment| segment.points.iter())
        .map(to_coordinate)
        .collect();

    if points.is_empty() {
        points = gpx.waypoints.iter().map(to_coordinate).collect();
    }
    if points.is_empty() {
        return Err(TraceError::Empty);
    }
    Ok(points)
}

/// Writes `route` as a single-track GPX 1.1 document.
pub fn write_route<W: Write>(route: &Route, name: Option<&str>, writer: W) -> Result<(), TraceError> {
    let mut gpx = Gpx {
        version: GpxVersion::Gpx11,
        creator: Some(CREATOR.into()),
        ..Default::default()
    };
    let mut track = Track {
        name: Some(name.unwrap_or(CREATOR).into()),
        ..Default::default()
    };

    let mut segment = TrackSegment::new();
    segment.points.extend(route.points().iter().map(to_waypoint));
    track.segments.push(segment);
    gpx.tracks.push(track);

    gpx::write(&gpx, writer)?;
    Ok(())
}

fn to_waypoint(coord: &Coordinate) -> Waypoint {
    Waypoint::new(Point::new(coord.lon, coord.lat))
}

fn to_coordinate(waypoint: &Waypoint) -> Coordinate {
    let point = waypoint.point();
    Coordinate::new(point.y(), point.x())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <trk>
    <name>morning run</name>
    <trkseg>
      <trkpt lat="45.0" lon="5.0"></trkpt>
      <trkpt lat="45.001" lon="5.002"></trkpt>
    </trkseg>
    <trkseg>
      <trkpt lat="45.002" lon="5.004"></trkpt>
    </trkseg>
  </trk>
</gpx>"#;

    const WAYPOINTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<gpx version="1.1" creator="test" xmlns="http://www.topografix.com/GPX/1/1">
  <wpt lat="44.5" lon="4.5"></wpt>
  <wpt lat="44.6" lon="4.6"></wpt>
</gpx>"#;

    #[test]
    fn reads_all_track_segments_in_order() {
        let points = read_trace(TRACK.as_bytes()).unwrap();
        assert_eq!(
            points,
            vec![
                Coordinate::new(45.0, 5.0),
                Coordinate::new(45.001, 5.002),
                Coordinate::new(45.002, 5.004),
            ]
        );
    }

    #[test]
    fn falls_back_to_waypoints() {
        let points = read_trace(WAYPOINTS.as_bytes()).unwrap();
        assert_eq!(points, vec![Coordinate::new(44.5, 4.5), Coordinate::new(44.6, 4.6)]);
    }

    #[test]
    fn rejects_empty_documents() {
        let empty = r#"<?xml version="1.0"?><gpx version="1.1" creator="test"></gpx>"#;
        assert!(matches!(read_trace(empty.as_bytes()), Err(TraceError::Empty)));
    }

    #[test]
    fn rejects_malformed_xml() {
        assert!(matches!(read_trace("not gpx".as_bytes()), Err(TraceError::Gpx(_))));
    }

    #[test]
    fn exported_route_reads_back() {
        let route = Route::new(vec![
            Coordinate::new(45.0, 5.0),
            Coordinate::new(45.01, 5.01),
            Coordinate::new(45.02, 5.0),
        ]);
        let mut buffer = Vec::new();
        write_route(&route, Some("delivery"), &mut buffer).unwrap();

        let xml = String::from_utf8(buffer.clone()).unwrap();
        assert!(xml.contains("delivery"));
        assert_eq!(read_trace(buffer.as_slice()).unwrap(), route.points());
    }
}
