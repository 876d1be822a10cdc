// Graph exports: node-link JSON, GraphML, GEXF and CSV tables

use holdmap_scanner::graph::GraphStore;
use holdmap_scanner::source::Attributes;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Company situation code for an active registration.
const ACTIVE_SITUATION: &str = "02";
const NODE_SIZE: &str = "10";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Json,
    GraphMl,
    Gexf,
    Csv,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(ReportFormat::Json),
            "graphml" => Some(ReportFormat::GraphMl),
            "gexf" => Some(ReportFormat::Gexf),
            "csv" => Some(ReportFormat::Csv),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::GraphMl => "graphml",
            ReportFormat::Gexf => "gexf",
            ReportFormat::Csv => "csv",
        }
    }
}

/// Attribute value type as declared by GraphML and GEXF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrType {
    Boolean,
    Long,
    Double,
    String,
}

impl AttrType {
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(AttrType::Boolean),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(AttrType::Long),
            Value::Number(_) => Some(AttrType::Double),
            _ => Some(AttrType::String),
        }
    }

    fn merge(self, other: AttrType) -> AttrType {
        match (self, other) {
            (a, b) if a == b => a,
            (AttrType::Long, AttrType::Double) | (AttrType::Double, AttrType::Long) => AttrType::Double,
            _ => AttrType::String,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            AttrType::Boolean => "boolean",
            AttrType::Long => "long",
            AttrType::Double => "double",
            AttrType::String => "string",
        }
    }
}

/// Node-link JSON, the layout networkx and d3 read.
pub fn generate_json_export(graph: &GraphStore) -> Result<String> {
    let nodes: Vec<Value> = graph
        .nodes()
        .into_iter()
        .map(|(key, attributes)| with_field(attributes, "id", key))
        .collect();

    let edges = graph.edges();
    let links: Vec<Value> = edges
        .iter()
        .map(|(source, target, attributes)| {
            let link = with_field(attributes.clone(), "source", source.clone());
            match link {
                Value::Object(mut map) => {
                    map.insert("target".to_string(), Value::from(target.as_str()));
                    Value::Object(map)
                }
                other => other,
            }
        })
        .collect();

    let document = serde_json::json!({
        "directed": true,
        "multigraph": has_parallel_edges(&edges),
        "graph": {
            "generator": "holdmap",
            "version": env!("CARGO_PKG_VERSION"),
            "generated_at": chrono::Utc::now().to_rfc3339(),
        },
        "nodes": nodes,
        "links": links,
    });

    Ok(serde_json::to_string_pretty(&document)?)
}

pub fn generate_graphml_export(graph: &GraphStore) -> Result<String> {
    let nodes = graph.nodes();
    let edges = graph.edges();
    let node_keys = declared_types(nodes.iter().map(|(_, attributes)| attributes));
    let edge_keys = declared_types(edges.iter().map(|(_, _, attributes)| attributes));

    // GraphML key ids are shared across nodes and edges
    let node_ids: BTreeMap<&str, String> = node_keys
        .keys()
        .enumerate()
        .map(|(i, name)| (name.as_str(), format!("d{}", i)))
        .collect();
    let edge_ids: BTreeMap<&str, String> = edge_keys
        .keys()
        .enumerate()
        .map(|(i, name)| (name.as_str(), format!("d{}", i + node_keys.len())))
        .collect();

    let mut xml = XmlDocument::new()?;
    xml.start(
        "graphml",
        &[
            ("xmlns", "http://graphml.graphdrawing.org/xmlns"),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            (
                "xsi:schemaLocation",
                "http://graphml.graphdrawing.org/xmlns http://graphml.graphdrawing.org/xmlns/1.0/graphml.xsd",
            ),
        ],
    )?;

    for (scope, keys, ids) in [("node", &node_keys, &node_ids), ("edge", &edge_keys, &edge_ids)] {
        for (name, attr_type) in keys.iter() {
            xml.empty(
                "key",
                &[
                    ("id", ids[name.as_str()].as_str()),
                    ("for", scope),
                    ("attr.name", name.as_str()),
                    ("attr.type", attr_type.as_str()),
                ],
            )?;
        }
    }

    xml.start("graph", &[("edgedefault", "directed")])?;

    for (key, attributes) in &nodes {
        xml.start("node", &[("id", key.as_str())])?;
        for (name, value) in attributes {
            if let Some(text) = value_text(value) {
                xml.text_element("data", &[("key", node_ids[name.as_str()].as_str())], &text)?;
            }
        }
        xml.end("node")?;
    }

    for (source, target, attributes) in &edges {
        xml.start("edge", &[("source", source.as_str()), ("target", target.as_str())])?;
        for (name, value) in attributes {
            if let Some(text) = value_text(value) {
                xml.text_element("data", &[("key", edge_ids[name.as_str()].as_str())], &text)?;
            }
        }
        xml.end("edge")?;
    }

    xml.end("graph")?;
    xml.end("graphml")?;
    Ok(xml.finish())
}

/// GEXF 1.2 with viz size and color, no positions.
pub fn generate_gexf_export(graph: &GraphStore) -> Result<String> {
    let nodes = graph.nodes();
    let edges = graph.edges();
    let node_keys = declared_types(nodes.iter().map(|(_, attributes)| attributes));
    let edge_keys = declared_types(edges.iter().map(|(_, _, attributes)| attributes));
    let node_ids: BTreeMap<&str, String> = node_keys
        .keys()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i.to_string()))
        .collect();
    let edge_ids: BTreeMap<&str, String> = edge_keys
        .keys()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i.to_string()))
        .collect();

    let mut xml = XmlDocument::new()?;
    xml.start(
        "gexf",
        &[
            ("xmlns", "http://gexf.net/1.2"),
            ("xmlns:viz", "http://gexf.net/1.2/viz"),
            ("version", "1.2"),
        ],
    )?;

    let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
    xml.start("meta", &[("lastmodifieddate", today.as_str())])?;
    xml.text_element("creator", &[], &format!("holdmap {}", env!("CARGO_PKG_VERSION")))?;
    xml.end("meta")?;

    xml.start("graph", &[("defaultedgetype", "directed"), ("mode", "static")])?;

    for (class, keys, ids) in [("node", &node_keys, &node_ids), ("edge", &edge_keys, &edge_ids)] {
        xml.start("attributes", &[("class", class), ("mode", "static")])?;
        for (name, attr_type) in keys.iter() {
            xml.empty(
                "attribute",
                &[
                    ("id", ids[name.as_str()].as_str()),
                    ("title", name.as_str()),
                    ("type", attr_type.as_str()),
                ],
            )?;
        }
        xml.end("attributes")?;
    }

    xml.start("nodes", &[])?;
    for (key, attributes) in &nodes {
        let label = attributes
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(key.as_str());
        xml.start("node", &[("id", key.as_str()), ("label", label)])?;
        write_attvalues(&mut xml, attributes, &node_ids)?;

        let (r, g, b) = node_color(attributes);
        xml.empty("viz:size", &[("value", NODE_SIZE)])?;
        xml.empty(
            "viz:color",
            &[
                ("r", r.to_string().as_str()),
                ("g", g.to_string().as_str()),
                ("b", b.to_string().as_str()),
                ("a", "1"),
            ],
        )?;
        xml.end("node")?;
    }
    xml.end("nodes")?;

    xml.start("edges", &[])?;
    for (idx, (source, target, attributes)) in edges.iter().enumerate() {
        let id = idx.to_string();
        xml.start(
            "edge",
            &[("id", id.as_str()), ("source", source.as_str()), ("target", target.as_str())],
        )?;
        write_attvalues(&mut xml, attributes, &edge_ids)?;
        xml.end("edge")?;
    }
    xml.end("edges")?;

    xml.end("graph")?;
    xml.end("gexf")?;
    Ok(xml.finish())
}

/// Tabular view of the nodes: key, derived fields, then every registry column
/// seen on any node.
pub fn generate_nodes_csv(graph: &GraphStore) -> Result<String> {
    let nodes = graph.nodes();
    let leading = ["name", "kind", "partner_type", "depth", "expansion_state"];

    let mut columns: Vec<String> = leading.iter().map(|c| c.to_string()).collect();
    let mut extra: Vec<String> = nodes
        .iter()
        .flat_map(|(_, attributes)| attributes.keys().cloned())
        .filter(|name| !leading.contains(&name.as_str()))
        .collect();
    extra.sort();
    extra.dedup();
    columns.extend(extra);

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(std::iter::once("key").chain(columns.iter().map(String::as_str)))?;

    for (key, attributes) in &nodes {
        let mut record = vec![key.clone()];
        record.extend(
            columns
                .iter()
                .map(|column| attributes.get(column).and_then(value_text).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }

    finish_csv(writer)
}

pub fn generate_edges_csv(graph: &GraphStore) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(["source", "target", "kind", "qualification_code", "entry_date"])?;

    for (source, target, edge) in graph.iter_edges() {
        writer.write_record([
            source,
            target,
            edge.relation_kind.as_str(),
            edge.qualification_code.as_str(),
            edge.entry_date.as_deref().unwrap_or_default(),
        ])?;
    }

    finish_csv(writer)
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write `graph` in `format` next to `path`. CSV produces two files,
/// `<stem>_nodes.csv` and `<stem>_edges.csv`. Returns the files written.
pub fn export_graph(graph: &GraphStore, format: ReportFormat, path: &Path) -> Result<Vec<PathBuf>> {
    match format {
        ReportFormat::Json => save_single(&generate_json_export(graph)?, path),
        ReportFormat::GraphMl => save_single(&generate_graphml_export(graph)?, path),
        ReportFormat::Gexf => save_single(&generate_gexf_export(graph)?, path),
        ReportFormat::Csv => {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "graph".to_string());
            let nodes_path = path.with_file_name(format!("{}_nodes.csv", stem));
            let edges_path = path.with_file_name(format!("{}_edges.csv", stem));

            save_report(&generate_nodes_csv(graph)?, &nodes_path)?;
            save_report(&generate_edges_csv(graph)?, &edges_path)?;
            Ok(vec![nodes_path, edges_path])
        }
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn save_single(content: &str, path: &Path) -> Result<Vec<PathBuf>> {
    save_report(content, path)?;
    Ok(vec![path.to_path_buf()])
}

fn with_field(attributes: Attributes, name: &str, value: String) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(name.to_string(), Value::from(value));
    map.extend(attributes);
    Value::Object(map)
}

fn has_parallel_edges(edges: &[(String, String, Attributes)]) -> bool {
    let mut seen = std::collections::HashSet::new();
    edges
        .iter()
        .any(|(source, target, _)| !seen.insert((source.as_str(), target.as_str())))
}

/// Declared type per attribute name, null-only attributes included as strings.
fn declared_types<'a>(maps: impl Iterator<Item = &'a Attributes>) -> BTreeMap<String, AttrType> {
    let mut declared: BTreeMap<String, Option<AttrType>> = BTreeMap::new();
    for attributes in maps {
        for (name, value) in attributes {
            let entry = declared.entry(name.clone()).or_insert(None);
            if let Some(attr_type) = AttrType::of(value) {
                *entry = Some(match *entry {
                    Some(existing) => existing.merge(attr_type),
                    None => attr_type,
                });
            }
        }
    }

    declared
        .into_iter()
        .map(|(name, attr_type)| (name, attr_type.unwrap_or(AttrType::String)))
        .collect()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn node_color(attributes: &Attributes) -> (u8, u8, u8) {
    let is_company = attributes.get("kind").and_then(Value::as_str) == Some("legal_entity");
    if !is_company {
        return (46, 125, 32);
    }

    match attributes.get("situacao").and_then(Value::as_str) {
        Some(ACTIVE_SITUATION) => (1, 57, 155),
        _ => (255, 0, 0),
    }
}

fn write_attvalues(xml: &mut XmlDocument, attributes: &Attributes, ids: &BTreeMap<&str, String>) -> Result<()> {
    let values: Vec<(&str, String)> = attributes
        .iter()
        .filter_map(|(name, value)| Some((ids[name.as_str()].as_str(), value_text(value)?)))
        .collect();
    if values.is_empty() {
        return Ok(());
    }

    xml.start("attvalues", &[])?;
    for (id, text) in &values {
        xml.empty("attvalue", &[("for", *id), ("value", text.as_str())])?;
    }
    xml.end("attvalues")
}

/// Indented XML writer over an in-memory buffer.
struct XmlDocument {
    writer: Writer<Vec<u8>>,
}

impl XmlDocument {
    fn new() -> Result<Self> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(Self { writer })
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Start(element))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.writer.write_event(Event::Empty(element))?;
        Ok(())
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attributes)?;
        self.writer.write_event(Event::Text(BytesText::new(text)))?;
        self.end(name)
    }

    fn finish(self) -> String {
        let mut xml = String::from_utf8_lossy(&self.writer.into_inner()).into_owned();
        xml.push('\n');
        xml
    }
}
