//! Structural description of a processing pipeline.
//!
//! A `PipelineGraph` is plain data: named elements with string properties and
//! the links between them. The pipeline builder assembles one per job and the
//! engine executes it. Links that only become known while the pipeline runs
//! (decoder output streams) are added by the engine to its own copy, so a
//! graph dump of a running job shows them too.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::{CoreError, CoreResult};

/// One node in the pipeline graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub factory: String,
    properties: BTreeMap<String, String>,
}

impl Element {
    pub fn new(factory: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factory: factory.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A directed connection between two elements. `src_pad` is set for links made
/// from a dynamically exposed output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub src: String,
    pub sink: String,
    pub src_pad: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineGraph {
    name: String,
    elements: Vec<Element>,
    links: Vec<Link>,
}

impl PipelineGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Adds an element. Names are unique within a graph.
    pub fn add(&mut self, element: Element) -> CoreResult<()> {
        if self.element(&element.name).is_some() {
            return Err(CoreError::Graph(format!(
                "element '{}' already exists in {}",
                element.name, self.name
            )));
        }
        self.elements.push(element);
        Ok(())
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    pub fn element_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.elements.iter_mut().find(|e| e.name == name)
    }

    /// First element created from `factory`.
    pub fn element_by_factory(&self, factory: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.factory == factory)
    }

    pub fn link(&mut self, src: &str, sink: &str) -> CoreResult<()> {
        self.add_link(src, sink, None)
    }

    /// Links consecutive elements of `chain`.
    pub fn link_many(&mut self, chain: &[&str]) -> CoreResult<()> {
        for pair in chain.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    /// Links a dynamically exposed pad of `src` into `sink`.
    pub fn link_pad(&mut self, src: &str, pad: &str, sink: &str) -> CoreResult<()> {
        self.add_link(src, sink, Some(pad.to_string()))
    }

    /// The link feeding `sink`, if any. Every element has a single input.
    pub fn upstream_link(&self, sink: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.sink == sink)
    }

    fn add_link(&mut self, src: &str, sink: &str, src_pad: Option<String>) -> CoreResult<()> {
        for name in [src, sink] {
            if self.element(name).is_none() {
                return Err(CoreError::Graph(format!(
                    "cannot link {} -> {}: no element named '{}'",
                    src, sink, name
                )));
            }
        }
        if self.upstream_link(sink).is_some() {
            return Err(CoreError::Graph(format!(
                "cannot link {} -> {}: '{}' is already linked",
                src, sink, sink
            )));
        }
        self.links.push(Link {
            src: src.to_string(),
            sink: sink.to_string(),
            src_pad,
        });
        Ok(())
    }

    /// Renders the graph in Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph \"{}\" {{", escape(&self.name));
        let _ = writeln!(dot, "  rankdir=LR;");
        let _ = writeln!(dot, "  node [shape=box];");
        for element in &self.elements {
            let mut label = format!("{}\\n[{}]", escape(&element.name), escape(&element.factory));
            for (key, value) in element.properties() {
                let _ = write!(label, "\\n{}={}", escape(key), escape(value));
            }
            let _ = writeln!(dot, "  \"{}\" [label=\"{}\"];", escape(&element.name), label);
        }
        for link in &self.links {
            match &link.src_pad {
                Some(pad) => {
                    let _ = writeln!(
                        dot,
                        "  \"{}\" -> \"{}\" [label=\"{}\"];",
                        escape(&link.src),
                        escape(&link.sink),
                        escape(pad)
                    );
                }
                None => {
                    let _ = writeln!(dot, "  \"{}\" -> \"{}\";", escape(&link.src), escape(&link.sink));
                }
            }
        }
        dot.push_str("}\n");
        dot
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
