//! Deserializes archive blobs and feeds them to a [`ReplayConsumer`].
//!
//! The parser owns one output cell per record it has seen and resolves
//! hash references against those cells. The phase ordering makes this
//! sound: a record can only reference categories that replayed in an
//! earlier phase, and the barrier after render passes guarantees that the
//! asynchronously built shader modules are published before any pipeline
//! record is parsed.

use std::collections::HashMap;
use std::sync::Arc;

use crate::descriptors::{
    ApplicationStateDesc, ComputePipelineDesc, DescriptorSetLayoutDesc, GraphicsPipelineDesc,
    PipelineLayoutDesc, RenderPassDesc, ResolvedComputePipeline, ResolvedGraphicsPipeline,
    ResolvedPipelineLayout, ResolvedSetLayout, SamplerDesc, ShaderModuleDesc,
};
use crate::device::RawHandle;
use crate::replay::registry::HandleSlot;
use crate::replay::{ReplayConsumer, ReplayError};
use crate::{Hash, ResourceKind};

#[derive(Debug)]
pub enum ParseError {
    Json(serde_json::Error),
    /// A record referenced an object that was never replayed or whose
    /// creation failed.
    UnresolvedReference { kind: ResourceKind, hash: Hash },
    Replay(ReplayError),
}

impl From<serde_json::Error> for ParseError {
    fn from(err: serde_json::Error) -> Self {
        ParseError::Json(err)
    }
}

impl From<ReplayError> for ParseError {
    fn from(err: ReplayError) -> Self {
        ParseError::Replay(err)
    }
}

type SlotMap = HashMap<Hash, Arc<HandleSlot>>;

fn slot_of(map: &mut SlotMap, hash: Hash) -> Arc<HandleSlot> {
    map.entry(hash).or_default().clone()
}

fn resolve(map: &SlotMap, kind: ResourceKind, hash: Hash) -> Result<RawHandle, ParseError> {
    match map.get(&hash) {
        Some(slot) if !slot.is_null() => Ok(slot.get()),
        _ => Err(ParseError::UnresolvedReference { kind, hash }),
    }
}

#[derive(Default)]
pub struct RecordParser {
    samplers: SlotMap,
    descriptor_set_layouts: SlotMap,
    pipeline_layouts: SlotMap,
    render_passes: SlotMap,
    shader_modules: SlotMap,
    graphics_pipelines: SlotMap,
    compute_pipelines: SlotMap,
}

impl RecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one serialized record and invokes the matching consumer
    /// operation. Failures are logged with category and hash; the caller
    /// is expected to skip the record and continue.
    pub fn parse(
        &mut self,
        consumer: &dyn ReplayConsumer,
        kind: ResourceKind,
        hash: Hash,
        blob: &[u8],
    ) -> Result<(), ParseError> {
        let result = self.parse_record(consumer, kind, hash, blob);
        match &result {
            Err(ParseError::Json(err)) => {
                log::error!("Failed to parse {:?} record {:#018x}: {}", kind, hash, err);
            }
            Err(ParseError::UnresolvedReference {
                kind: referenced_kind,
                hash: referenced_hash,
            }) => {
                log::error!(
                    "{:?} record {:#018x} references unresolved {:?} {:#018x}",
                    kind,
                    hash,
                    referenced_kind,
                    referenced_hash
                );
            }
            // Replay errors were already logged at the point of failure.
            Err(ParseError::Replay(_)) | Ok(()) => {}
        }
        result
    }

    fn parse_record(
        &mut self,
        consumer: &dyn ReplayConsumer,
        kind: ResourceKind,
        hash: Hash,
        blob: &[u8],
    ) -> Result<(), ParseError> {
        match kind {
            ResourceKind::ApplicationInfo => {
                let state: ApplicationStateDesc = serde_json::from_slice(blob)?;
                consumer.set_application_info(&state.application_info, &state.features)?;
            }
            ResourceKind::Sampler => {
                let desc: SamplerDesc = serde_json::from_slice(blob)?;
                let output = slot_of(&mut self.samplers, hash);
                consumer.enqueue_sampler(hash, desc, &output)?;
            }
            ResourceKind::DescriptorSetLayout => {
                let desc: DescriptorSetLayoutDesc = serde_json::from_slice(blob)?;
                let immutable_samplers = desc
                    .bindings
                    .iter()
                    .map(|binding| {
                        binding
                            .immutable_samplers
                            .iter()
                            .map(|sampler| {
                                resolve(&self.samplers, ResourceKind::Sampler, *sampler)
                            })
                            .collect::<Result<Vec<_>, _>>()
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let output = slot_of(&mut self.descriptor_set_layouts, hash);
                consumer.enqueue_descriptor_set_layout(
                    hash,
                    ResolvedSetLayout {
                        desc,
                        immutable_samplers,
                    },
                    &output,
                )?;
            }
            ResourceKind::PipelineLayout => {
                let desc: PipelineLayoutDesc = serde_json::from_slice(blob)?;
                let set_layouts = desc
                    .set_layouts
                    .iter()
                    .map(|layout| {
                        resolve(
                            &self.descriptor_set_layouts,
                            ResourceKind::DescriptorSetLayout,
                            *layout,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let output = slot_of(&mut self.pipeline_layouts, hash);
                consumer.enqueue_pipeline_layout(
                    hash,
                    ResolvedPipelineLayout { desc, set_layouts },
                    &output,
                )?;
            }
            ResourceKind::RenderPass => {
                let desc: RenderPassDesc = serde_json::from_slice(blob)?;
                let output = slot_of(&mut self.render_passes, hash);
                consumer.enqueue_render_pass(hash, desc, &output)?;
            }
            ResourceKind::ShaderModule => {
                let desc: ShaderModuleDesc = serde_json::from_slice(blob)?;
                let output = slot_of(&mut self.shader_modules, hash);
                consumer.enqueue_shader_module(hash, desc, &output)?;
            }
            ResourceKind::GraphicsPipeline => {
                let desc: GraphicsPipelineDesc = serde_json::from_slice(blob)?;
                let stage_modules = desc
                    .stages
                    .iter()
                    .map(|stage| {
                        resolve(&self.shader_modules, ResourceKind::ShaderModule, stage.module)
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                let layout = resolve(
                    &self.pipeline_layouts,
                    ResourceKind::PipelineLayout,
                    desc.layout,
                )?;
                // Hash 0 means no render pass (dynamic rendering).
                let render_pass = if desc.render_pass == 0 {
                    crate::device::NULL_HANDLE
                } else {
                    resolve(
                        &self.render_passes,
                        ResourceKind::RenderPass,
                        desc.render_pass,
                    )?
                };
                let output = slot_of(&mut self.graphics_pipelines, hash);
                consumer.enqueue_graphics_pipeline(
                    hash,
                    ResolvedGraphicsPipeline {
                        desc,
                        stage_modules,
                        layout,
                        render_pass,
                    },
                    &output,
                )?;
            }
            ResourceKind::ComputePipeline => {
                let desc: ComputePipelineDesc = serde_json::from_slice(blob)?;
                let module = resolve(
                    &self.shader_modules,
                    ResourceKind::ShaderModule,
                    desc.stage.module,
                )?;
                let layout = resolve(
                    &self.pipeline_layouts,
                    ResourceKind::PipelineLayout,
                    desc.layout,
                )?;
                let output = slot_of(&mut self.compute_pipelines, hash);
                consumer.enqueue_compute_pipeline(
                    hash,
                    ResolvedComputePipeline {
                        desc,
                        module,
                        layout,
                    },
                    &output,
                )?;
            }
        }
        Ok(())
    }

    /// Output cell for a record, if that record has been parsed.
    pub fn output(&self, kind: ResourceKind, hash: Hash) -> Option<Arc<HandleSlot>> {
        let map = match kind {
            ResourceKind::Sampler => &self.samplers,
            ResourceKind::DescriptorSetLayout => &self.descriptor_set_layouts,
            ResourceKind::PipelineLayout => &self.pipeline_layouts,
            ResourceKind::RenderPass => &self.render_passes,
            ResourceKind::ShaderModule => &self.shader_modules,
            ResourceKind::GraphicsPipeline => &self.graphics_pipelines,
            ResourceKind::ComputePipeline => &self.compute_pipelines,
            ResourceKind::ApplicationInfo => return None,
        };
        map.get(&hash).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::null::NullDevice;
    use crate::filter::ReplayFilter;
    use crate::replay::{ReplayOptions, Replayer};

    fn replayer(device: &Arc<NullDevice>) -> Replayer {
        Replayer::new(
            device.clone(),
            ReplayFilter::all(),
            ReplayOptions {
                num_threads: 1,
                loop_count: 1,
            },
        )
    }

    #[test]
    fn malformed_json_is_an_error() {
        let device = Arc::new(NullDevice::new());
        let replayer = replayer(&device);
        let mut parser = RecordParser::new();

        let result = parser.parse(&replayer, ResourceKind::Sampler, 0x1, b"{not json");
        assert!(matches!(result, Err(ParseError::Json(_))));
    }

    #[test]
    fn pipeline_with_unknown_layout_is_rejected() {
        let device = Arc::new(NullDevice::new());
        let replayer = replayer(&device);
        let mut parser = RecordParser::new();

        let blob = serde_json::to_vec(&ComputePipelineDesc {
            layout: 0xBEEF,
            ..Default::default()
        })
        .unwrap();
        let result = parser.parse(&replayer, ResourceKind::ComputePipeline, 0x1, &blob);
        assert!(matches!(
            result,
            Err(ParseError::UnresolvedReference {
                kind: ResourceKind::ShaderModule,
                ..
            })
        ));
    }

    #[test]
    fn references_resolve_to_live_handles() {
        let device = Arc::new(NullDevice::new());
        let replayer = replayer(&device);
        let mut parser = RecordParser::new();

        let sampler = serde_json::to_vec(&SamplerDesc::default()).unwrap();
        parser
            .parse(&replayer, ResourceKind::Sampler, 0x10, &sampler)
            .unwrap();

        let layout = serde_json::to_vec(&serde_json::json!({
            "bindings": [{
                "binding": 0,
                "descriptor_type": 0,
                "descriptor_count": 1,
                "stage_flags": 16,
                "immutable_samplers": [0x10]
            }]
        }))
        .unwrap();
        parser
            .parse(&replayer, ResourceKind::DescriptorSetLayout, 0x20, &layout)
            .unwrap();

        let sampler_handle = parser
            .output(ResourceKind::Sampler, 0x10)
            .unwrap()
            .get();
        assert_ne!(sampler_handle, 0);

        let events = device.events();
        let layout_inputs = events
            .iter()
            .find_map(|event| match event {
                crate::device::null::DeviceEvent::Create {
                    kind: ResourceKind::DescriptorSetLayout,
                    inputs,
                    ..
                } => Some(inputs.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(layout_inputs, vec![sampler_handle]);
    }
}
