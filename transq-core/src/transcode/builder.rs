// ============================================================================
// transq-core/src/transcode/builder.rs
// ============================================================================
//
// PIPELINE BUILDER: Per-Job Processing Graph Assembly
//
// Every job gets the same static skeleton:
//
//   src -> decode ~~> convert -> resample -> [encoder] -> [muxer] -> sink
//
// The `~~>` link cannot be made here. The decoder only exposes its output
// streams once the engine has inspected the input, so that link is completed
// by the runner's pad-added continuation while the pipeline runs.
//
// Any element that cannot be resolved or created aborts the whole build; the
// partially assembled graph is dropped without ever being launched.

use crate::config::TranscoderConfig;
use crate::engine::{factory, Element, ElementRole, MediaEngine, PipelineGraph};
use crate::error::{CoreError, CoreResult};
use crate::transcode::job::{Job, JobId};
use crate::transcode::resolver::create_element_for_mime_type;

pub const SRC: &str = "src";
pub const DECODE: &str = "decode";
pub const CONVERT: &str = "convert";
pub const RESAMPLE: &str = "resample";
pub const ENCODER: &str = "encoder";
pub const MUXER: &str = "muxer";
pub const SINK: &str = "sink";

/// A fully resolved, not yet launched pipeline.
#[derive(Debug, Clone)]
pub struct TranscodePipeline {
    pub graph: PipelineGraph,
    /// Element the decoder's audio stream must be linked into.
    pub convert: String,
    /// Factory chosen for the encoder, if the preset needs one.
    pub encoder: Option<String>,
    /// Factory chosen for the muxer, if the preset needs one.
    pub muxer: Option<String>,
}

/// Assembles the static part of the pipeline for `job`.
pub fn build_pipeline(
    engine: &dyn MediaEngine,
    config: &TranscoderConfig,
    job: &Job,
    id: JobId,
) -> CoreResult<TranscodePipeline> {
    let preset = &job.preset;
    if preset.codec_mimetype.is_empty() && preset.muxer_mimetype.is_empty() {
        return Err(CoreError::Graph(format!(
            "preset '{}' produces neither a codec nor a container",
            preset.name
        )));
    }

    let mut graph = PipelineGraph::new(format!("transcode-{}", id));

    let mut src = engine.make_element(factory::FILE_SRC, SRC)?;
    src.set_property("location", job.input.to_string_lossy());
    add(&mut graph, config, src)?;

    for (factory_name, name) in [
        (factory::DECODE_BIN, DECODE),
        (factory::AUDIO_CONVERT, CONVERT),
        (factory::AUDIO_RESAMPLE, RESAMPLE),
    ] {
        let element = engine.make_element(factory_name, name)?;
        add(&mut graph, config, element)?;
    }

    let mut chain = vec![CONVERT, RESAMPLE];

    let encoder = if preset.codec_mimetype.is_empty() {
        None
    } else {
        let element = create_element_for_mime_type(
            engine,
            ElementRole::Encoder,
            &preset.codec_mimetype,
            &mut graph,
            ENCODER,
        )?;
        apply_properties(&mut graph, config, &element)?;
        chain.push(ENCODER);
        Some(element.factory)
    };

    let muxer = if preset.muxer_mimetype.is_empty() {
        None
    } else {
        let element = create_element_for_mime_type(
            engine,
            ElementRole::Muxer,
            &preset.muxer_mimetype,
            &mut graph,
            MUXER,
        )?;
        apply_properties(&mut graph, config, &element)?;
        chain.push(MUXER);
        Some(element.factory)
    };

    let mut sink = engine.make_element(factory::FILE_SINK, SINK)?;
    sink.set_property("location", job.output.to_string_lossy());
    sink.set_property("overwrite", job.overwrite.to_string());
    add(&mut graph, config, sink)?;
    chain.push(SINK);

    graph.link(SRC, DECODE)?;
    graph.link_many(&chain)?;

    Ok(TranscodePipeline {
        graph,
        convert: CONVERT.to_string(),
        encoder,
        muxer,
    })
}

/// Adds `element` after applying the configured overrides for its factory.
fn add(graph: &mut PipelineGraph, config: &TranscoderConfig, mut element: Element) -> CoreResult<()> {
    if let Some(properties) = config.properties_for(&element.factory) {
        for (key, value) in properties {
            element.set_property(key.as_str(), value.as_str());
        }
    }
    graph.add(element)
}

/// Applies the configured overrides to an element already in the graph.
fn apply_properties(graph: &mut PipelineGraph, config: &TranscoderConfig, element: &Element) -> CoreResult<()> {
    let Some(properties) = config.properties_for(&element.factory) else {
        return Ok(());
    };
    let target = graph
        .element_mut(&element.name)
        .ok_or_else(|| CoreError::Graph(format!("element '{}' vanished from the graph", element.name)))?;
    for (key, value) in properties {
        log::debug!("Setting {}.{} = {}", element.factory, key, value);
        target.set_property(key.as_str(), value.as_str());
    }
    Ok(())
}
