//! SVG rendering of an entity-relationship diagram.
//!
//! Tables are placed in dependency layers: tables without foreign keys go in
//! the leftmost column, and every other table sits one column to the right of
//! its deepest parent. Each foreign key becomes an orthogonal connector from
//! the child's column row to the referenced row of the parent. Connectors
//! only run through the gaps between layers and the margin above the boxes,
//! never across a table.

use std::collections::HashMap;

use svg::node::element::{Definitions, Group, Marker, Path, Rectangle, Text};
use svg::Document;

use snapgram_types::{ColumnDef, ForeignKeyDef, SchemaMetadata, TableDef};

use crate::error::DiagramError;

const MARGIN: f32 = 40.0;
const HEADER_HEIGHT: f32 = 28.0;
const ROW_HEIGHT: f32 = 20.0;
const COLUMN_GAP: f32 = 260.0;
const ROW_GAP: f32 = 36.0;
const MIN_BOX_WIDTH: f32 = 180.0;
const CHAR_WIDTH: f32 = 7.2;
const TEXT_PADDING: f32 = 10.0;
const LOOP_REACH: f32 = 30.0;

const FONT_FAMILY: &str = "Helvetica, Arial, sans-serif";
const BORDER_COLOR: &str = "#34495e";
const HEADER_FILL: &str = "#2c3e50";
const EDGE_COLOR: &str = "#7f8c8d";
const ARROW_ID: &str = "fk-arrow";

#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    x: f32,
    y: f32,
}

/// Placement of one table box
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    layer: usize,
    x: f32,
    y: f32,
    height: f32,
}

impl Placement {
    fn row_center(&self, row: usize) -> f32 {
        self.y + HEADER_HEIGHT + ROW_HEIGHT * row as f32 + ROW_HEIGHT / 2.0
    }
}

/// Render the schema into a complete SVG document.
pub fn render(schema: &SchemaMetadata) -> Result<Document, DiagramError> {
    if schema.tables.is_empty() {
        return Err(DiagramError::Render("schema has no tables".to_string()));
    }

    for table in &schema.tables {
        for fk in &table.foreign_keys {
            if schema.table(&fk.references_table).is_none() {
                return Err(DiagramError::Render(format!(
                    "{}.{} references unknown table '{}'",
                    table.name, fk.column, fk.references_table
                )));
            }
        }
    }

    let box_width = box_width(schema);
    let placements = layout(schema, box_width);

    let width = placements
        .values()
        .map(|p| p.x + box_width)
        .fold(0.0_f32, f32::max)
        + MARGIN;
    let height = placements
        .values()
        .map(|p| p.y + p.height)
        .fold(0.0_f32, f32::max)
        + MARGIN;

    tracing::debug!(tables = schema.tables.len(), width, height, "Rendering diagram");

    let mut edges = Group::new().set("class", "relations");
    for (table, fk, route) in edge_routes(schema, &placements, box_width) {
        edges = edges.add(render_edge(table, fk, &route));
    }

    let mut boxes = Group::new().set("class", "tables");
    for table in &schema.tables {
        if let Some(placement) = placements.get(table.name.as_str()) {
            boxes = boxes.add(render_table(table, placement, box_width));
        }
    }

    let document = Document::new()
        .set("viewBox", format!("0 0 {width} {height}"))
        .set("width", width)
        .set("height", height)
        .add(arrow_marker())
        .add(
            Rectangle::new()
                .set("width", "100%")
                .set("height", "100%")
                .set("fill", "white"),
        )
        .add(boxes)
        .add(edges);

    Ok(document)
}

/// Layer of every table: 0 without parents, otherwise one past the deepest parent.
fn layers(schema: &SchemaMetadata) -> HashMap<&str, usize> {
    let mut layers: HashMap<&str, usize> = schema
        .tables
        .iter()
        .map(|t| (t.name.as_str(), 0))
        .collect();

    // Bounded relaxation; a reference cycle stops growing at the table count
    for _ in 0..schema.tables.len() {
        let mut changed = false;
        for table in &schema.tables {
            let wanted = table
                .foreign_keys
                .iter()
                .filter(|fk| fk.references_table != table.name)
                .filter_map(|fk| layers.get(fk.references_table.as_str()))
                .map(|layer| layer + 1)
                .max()
                .unwrap_or(0)
                .min(schema.tables.len() - 1);
            if layers.get(table.name.as_str()) != Some(&wanted) {
                layers.insert(table.name.as_str(), wanted);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    layers
}

fn layout(schema: &SchemaMetadata, box_width: f32) -> HashMap<&str, Placement> {
    let layers = layers(schema);
    let mut next_y: HashMap<usize, f32> = HashMap::new();
    let mut placements = HashMap::new();

    for table in &schema.tables {
        let layer = layers.get(table.name.as_str()).copied().unwrap_or(0);
        let y = next_y.entry(layer).or_insert(MARGIN);
        let height = HEADER_HEIGHT + ROW_HEIGHT * table.columns.len() as f32;

        placements.insert(
            table.name.as_str(),
            Placement {
                layer,
                x: MARGIN + layer as f32 * (box_width + COLUMN_GAP),
                y: *y,
                height,
            },
        );
        *y += height + ROW_GAP;
    }
    placements
}

fn box_width(schema: &SchemaMetadata) -> f32 {
    schema
        .tables
        .iter()
        .flat_map(|t| {
            std::iter::once(t.name.chars().count())
                .chain(t.columns.iter().map(|c| column_label(t, c).chars().count()))
        })
        .map(|chars| chars as f32 * CHAR_WIDTH + TEXT_PADDING * 2.0)
        .fold(MIN_BOX_WIDTH, f32::max)
}

fn column_label(table: &TableDef, column: &ColumnDef) -> String {
    let mut markers = Vec::new();
    if column.primary_key {
        markers.push("PK");
    }
    if table.foreign_key(&column.name).is_some() {
        markers.push("FK");
    }
    if column.unique {
        markers.push("UQ");
    }

    let nullable = if column.nullable { "?" } else { "" };
    if markers.is_empty() {
        format!("{}: {}{}", column.name, column.column_type, nullable)
    } else {
        format!(
            "[{}] {}: {}{}",
            markers.join(","),
            column.name,
            column.column_type,
            nullable
        )
    }
}

fn edge_label(fk: &ForeignKeyDef) -> String {
    match &fk.role {
        Some(role) => format!("{} ({}) {}", fk.column, role, fk.on_delete.as_sql()),
        None => format!("{} {}", fk.column, fk.on_delete.as_sql()),
    }
}

fn text(content: impl Into<String>, x: f32, y: f32) -> Text {
    Text::new(content)
        .set("x", x)
        .set("y", y)
        .set("font-family", FONT_FAMILY)
        .set("dominant-baseline", "middle")
}

fn render_table(table: &TableDef, placement: &Placement, box_width: f32) -> Group {
    let mut group = Group::new()
        .set("class", "table")
        .set("id", format!("table-{}", table.name))
        .add(
            Rectangle::new()
                .set("x", placement.x)
                .set("y", placement.y)
                .set("width", box_width)
                .set("height", placement.height)
                .set("fill", "white")
                .set("stroke", BORDER_COLOR)
                .set("stroke-width", 1.5)
                .set("rx", 4),
        )
        .add(
            Rectangle::new()
                .set("x", placement.x)
                .set("y", placement.y)
                .set("width", box_width)
                .set("height", HEADER_HEIGHT)
                .set("fill", HEADER_FILL)
                .set("rx", 4),
        )
        .add(
            text(
                table.name.clone(),
                placement.x + box_width / 2.0,
                placement.y + HEADER_HEIGHT / 2.0,
            )
            .set("text-anchor", "middle")
            .set("font-size", 14)
            .set("font-weight", "bold")
            .set("fill", "white"),
        );

    for (row, column) in table.columns.iter().enumerate() {
        let mut label = text(
            column_label(table, column),
            placement.x + TEXT_PADDING,
            placement.row_center(row),
        )
        .set("font-size", 12)
        .set("fill", BORDER_COLOR);
        if column.primary_key {
            label = label.set("font-weight", "bold");
        }
        group = group.add(label);
    }

    group
}

/// Connector corners for every foreign key, in declaration order.
fn edge_routes<'a>(
    schema: &'a SchemaMetadata,
    placements: &HashMap<&str, Placement>,
    box_width: f32,
) -> Vec<(&'a TableDef, &'a ForeignKeyDef, Vec<Point>)> {
    // Connectors into the same parent get distinct slots
    let mut incoming: HashMap<&str, usize> = HashMap::new();
    let mut routes = Vec::new();
    for table in &schema.tables {
        for fk in &table.foreign_keys {
            let slot = incoming.entry(fk.references_table.as_str()).or_insert(0);
            if let Some(route) = edge_route(schema, placements, box_width, table, fk, *slot) {
                routes.push((table, fk, route));
            }
            *slot += 1;
        }
    }
    routes
}

fn edge_route(
    schema: &SchemaMetadata,
    placements: &HashMap<&str, Placement>,
    box_width: f32,
    child: &TableDef,
    fk: &ForeignKeyDef,
    slot: usize,
) -> Option<Vec<Point>> {
    let from = placements.get(child.name.as_str())?;
    let to = placements.get(fk.references_table.as_str())?;
    let parent = schema.table(&fk.references_table)?;

    let source_row = child
        .columns
        .iter()
        .position(|c| c.name == fk.column)
        .unwrap_or(0);
    let target_row = parent
        .columns
        .iter()
        .position(|c| c.name == fk.references_column)
        .unwrap_or(0);

    // Fan incoming connectors out across the referenced row
    let spread = (slot % 5) as f32 * 3.0 - 6.0;
    let start = Point {
        x: from.x,
        y: from.row_center(source_row),
    };

    if child.name == parent.name {
        let end = Point {
            x: to.x,
            y: to.row_center(target_row),
        };
        return Some(loop_route(start, end));
    }

    if to.layer >= from.layer {
        // Parents in the same or a later layer only occur with reference cycles
        let end = Point {
            x: to.x,
            y: to.row_center(target_row) + spread,
        };
        return Some(loop_route(start, end));
    }

    let end = Point {
        x: to.x + box_width,
        y: to.row_center(target_row) + spread,
    };
    // Each connector gets its own vertical lane inside the gap
    let lane_offset = COLUMN_GAP * 0.3 + (slot % 8) as f32 * 10.0;
    let parent_lane = end.x + lane_offset;

    if from.layer - to.layer == 1 {
        return Some(orthogonal_route(start, end, parent_lane));
    }

    // Skip the layers in between through the top margin
    let child_lane = from.x - lane_offset;
    let corridor = MARGIN / 2.0 - (slot % 4) as f32 * 5.0;
    Some(vec![
        start,
        Point {
            x: child_lane,
            y: start.y,
        },
        Point {
            x: child_lane,
            y: corridor,
        },
        Point {
            x: parent_lane,
            y: corridor,
        },
        Point {
            x: parent_lane,
            y: end.y,
        },
        end,
    ])
}

fn render_edge(child: &TableDef, fk: &ForeignKeyDef, route: &[Point]) -> Group {
    let mut group = Group::new()
        .set("class", "relation")
        .set("id", format!("fk-{}-{}", child.name, fk.column));

    let Some(start) = route.first() else {
        return group;
    };

    group = group
        .add(
            Path::new()
                .set("d", path_data(route))
                .set("fill", "none")
                .set("stroke", EDGE_COLOR)
                .set("stroke-width", 1.2)
                .set("marker-end", format!("url(#{ARROW_ID})")),
        )
        .add(
            text(edge_label(fk), start.x - 6.0, start.y - 7.0)
                .set("text-anchor", "end")
                .set("font-size", 10)
                .set("fill", EDGE_COLOR),
        );
    group
}

fn path_data(points: &[Point]) -> String {
    points
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{} {} {}", if i == 0 { "M" } else { "L" }, p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn orthogonal_route(start: Point, end: Point, lane: f32) -> Vec<Point> {
    vec![
        start,
        Point {
            x: lane,
            y: start.y,
        },
        Point { x: lane, y: end.y },
        end,
    ]
}

/// Route leaving and re-entering on the left side of the boxes
fn loop_route(start: Point, end: Point) -> Vec<Point> {
    let reach = start.x.min(end.x) - LOOP_REACH;
    vec![
        start,
        Point {
            x: reach,
            y: start.y,
        },
        Point { x: reach, y: end.y },
        end,
    ]
}

fn arrow_marker() -> Definitions {
    Definitions::new().add(
        Marker::new()
            .set("id", ARROW_ID)
            .set("viewBox", "0 0 10 10")
            .set("refX", 9)
            .set("refY", 5)
            .set("markerWidth", 7)
            .set("markerHeight", 7)
            .set("orient", "auto")
            .add(
                Path::new()
                    .set("d", "M 0 0 L 10 5 L 0 10 z")
                    .set("fill", EDGE_COLOR),
            ),
    )
}
