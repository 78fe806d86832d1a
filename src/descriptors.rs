//! Owned creation records as stored in a replay archive.
//!
//! Records are deserialized from the archive's JSON blobs. Fields typed as
//! `i32`/`u32` carry the raw Vulkan enum or flag values recorded at capture
//! time; they are converted back with `vk::*::from_raw` by the Vulkan
//! backend and ignored by headless backends. References to other objects
//! are stored as content hashes and resolved to live handles by the record
//! parser before a record reaches a device.

use serde::{Deserialize, Serialize};

use crate::device::RawHandle;
use crate::Hash;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationInfoDesc {
    pub application_name: Option<String>,
    pub engine_name: Option<String>,
    pub application_version: u32,
    pub engine_version: u32,
    pub api_version: u32,
}

/// Subset of `VkPhysicalDeviceFeatures` a capture can request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceFeaturesDesc {
    pub robust_buffer_access: bool,
    pub full_draw_index_uint32: bool,
    pub independent_blend: bool,
    pub sampler_anisotropy: bool,
    pub fragment_stores_and_atomics: bool,
    pub shader_int64: bool,
    pub shader_int16: bool,
}

/// Blob stored under the ApplicationInfo category.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationStateDesc {
    pub application_info: ApplicationInfoDesc,
    pub features: DeviceFeaturesDesc,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerDesc {
    pub flags: u32,
    pub mag_filter: i32,
    pub min_filter: i32,
    pub mipmap_mode: i32,
    pub address_mode_u: i32,
    pub address_mode_v: i32,
    pub address_mode_w: i32,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: i32,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: i32,
    pub unnormalized_coordinates: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorSetLayoutBindingDesc {
    pub binding: u32,
    pub descriptor_type: i32,
    pub descriptor_count: u32,
    pub stage_flags: u32,
    /// Hashes of samplers bound immutably to this binding. Empty when the
    /// binding has no immutable samplers.
    pub immutable_samplers: Vec<Hash>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DescriptorSetLayoutDesc {
    pub flags: u32,
    pub bindings: Vec<DescriptorSetLayoutBindingDesc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConstantRangeDesc {
    pub stage_flags: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineLayoutDesc {
    pub flags: u32,
    pub set_layouts: Vec<Hash>,
    pub push_constant_ranges: Vec<PushConstantRangeDesc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentDesc {
    pub flags: u32,
    pub format: i32,
    pub samples: u32,
    pub load_op: i32,
    pub store_op: i32,
    pub stencil_load_op: i32,
    pub stencil_store_op: i32,
    pub initial_layout: i32,
    pub final_layout: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentRefDesc {
    pub attachment: u32,
    pub layout: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubpassDesc {
    pub pipeline_bind_point: i32,
    pub input_attachments: Vec<AttachmentRefDesc>,
    pub color_attachments: Vec<AttachmentRefDesc>,
    pub resolve_attachments: Vec<AttachmentRefDesc>,
    pub depth_stencil_attachment: Option<AttachmentRefDesc>,
    pub preserve_attachments: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubpassDependencyDesc {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src_stage_mask: u32,
    pub dst_stage_mask: u32,
    pub src_access_mask: u32,
    pub dst_access_mask: u32,
    pub dependency_flags: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderPassDesc {
    pub flags: u32,
    pub attachments: Vec<AttachmentDesc>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<SubpassDependencyDesc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderModuleDesc {
    /// SPIR-V code as 32-bit words.
    pub code: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StageDesc {
    pub flags: u32,
    /// Single `VkShaderStageFlagBits` value.
    pub stage: u32,
    pub module: Hash,
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexInputBindingDesc {
    pub binding: u32,
    pub stride: u32,
    pub input_rate: i32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexInputAttributeDesc {
    pub location: u32,
    pub binding: u32,
    pub format: i32,
    pub offset: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VertexInputDesc {
    pub bindings: Vec<VertexInputBindingDesc>,
    pub attributes: Vec<VertexInputAttributeDesc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputAssemblyDesc {
    pub topology: i32,
    pub primitive_restart_enable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TessellationDesc {
    pub patch_control_points: u32,
}

/// Viewports and scissors themselves are almost always dynamic state in
/// captured pipelines, so only the counts are recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportStateDesc {
    pub viewport_count: u32,
    pub scissor_count: u32,
}

impl Default for ViewportStateDesc {
    fn default() -> Self {
        Self {
            viewport_count: 1,
            scissor_count: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterizationDesc {
    pub depth_clamp_enable: bool,
    pub rasterizer_discard_enable: bool,
    pub polygon_mode: i32,
    pub cull_mode: u32,
    pub front_face: i32,
    pub depth_bias_enable: bool,
    pub depth_bias_constant_factor: f32,
    pub depth_bias_clamp: f32,
    pub depth_bias_slope_factor: f32,
    pub line_width: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MultisampleDesc {
    pub rasterization_samples: u32,
    pub sample_shading_enable: bool,
    pub min_sample_shading: f32,
    pub alpha_to_coverage_enable: bool,
    pub alpha_to_one_enable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StencilOpStateDesc {
    pub fail_op: i32,
    pub pass_op: i32,
    pub depth_fail_op: i32,
    pub compare_op: i32,
    pub compare_mask: u32,
    pub write_mask: u32,
    pub reference: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthStencilDesc {
    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: i32,
    pub depth_bounds_test_enable: bool,
    pub stencil_test_enable: bool,
    pub front: StencilOpStateDesc,
    pub back: StencilOpStateDesc,
    pub min_depth_bounds: f32,
    pub max_depth_bounds: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendAttachmentDesc {
    pub blend_enable: bool,
    pub src_color_blend_factor: i32,
    pub dst_color_blend_factor: i32,
    pub color_blend_op: i32,
    pub src_alpha_blend_factor: i32,
    pub dst_alpha_blend_factor: i32,
    pub alpha_blend_op: i32,
    pub color_write_mask: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorBlendDesc {
    pub logic_op_enable: bool,
    pub logic_op: i32,
    pub attachments: Vec<BlendAttachmentDesc>,
    pub blend_constants: [f32; 4],
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsPipelineDesc {
    pub flags: u32,
    pub stages: Vec<StageDesc>,
    pub vertex_input: VertexInputDesc,
    pub input_assembly: InputAssemblyDesc,
    pub tessellation: Option<TessellationDesc>,
    pub viewport: ViewportStateDesc,
    pub rasterization: RasterizationDesc,
    pub multisample: MultisampleDesc,
    pub depth_stencil: Option<DepthStencilDesc>,
    pub color_blend: Option<ColorBlendDesc>,
    /// Raw `VkDynamicState` values.
    pub dynamic_states: Vec<i32>,
    pub layout: Hash,
    pub render_pass: Hash,
    pub subpass: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputePipelineDesc {
    pub flags: u32,
    pub stage: StageDesc,
    pub layout: Hash,
}

/// A descriptor-set layout with immutable-sampler references resolved to
/// live handles, one list per binding (empty where a binding has none).
#[derive(Debug, Clone)]
pub struct ResolvedSetLayout {
    pub desc: DescriptorSetLayoutDesc,
    pub immutable_samplers: Vec<Vec<RawHandle>>,
}

#[derive(Debug, Clone)]
pub struct ResolvedPipelineLayout {
    pub desc: PipelineLayoutDesc,
    pub set_layouts: Vec<RawHandle>,
}

/// A graphics pipeline with every hash reference replaced by the live
/// handle it resolved to. `stage_modules` runs parallel to `desc.stages`.
#[derive(Debug, Clone)]
pub struct ResolvedGraphicsPipeline {
    pub desc: GraphicsPipelineDesc,
    pub stage_modules: Vec<RawHandle>,
    pub layout: RawHandle,
    pub render_pass: RawHandle,
}

#[derive(Debug, Clone)]
pub struct ResolvedComputePipeline {
    pub desc: ComputePipelineDesc,
    pub module: RawHandle,
    pub layout: RawHandle,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_accept_sparse_json() {
        let sampler: SamplerDesc = serde_json::from_str("{\"mag_filter\": 1}").unwrap();
        assert_eq!(sampler.mag_filter, 1);
        assert_eq!(sampler.min_filter, 0);
        assert!(!sampler.anisotropy_enable);

        let pipeline: GraphicsPipelineDesc = serde_json::from_str(
            "{\"stages\": [{\"stage\": 1, \"module\": 7, \"name\": \"main\"}], \"layout\": 1, \"render_pass\": 2}",
        )
        .unwrap();
        assert_eq!(pipeline.stages.len(), 1);
        assert_eq!(pipeline.stages[0].module, 7);
        assert_eq!(pipeline.viewport.viewport_count, 1);
        assert!(pipeline.depth_stencil.is_none());
    }

    #[test]
    fn application_state_defaults() {
        let state: ApplicationStateDesc = serde_json::from_str("{}").unwrap();
        assert!(state.application_info.application_name.is_none());
        assert!(!state.features.sampler_anisotropy);
    }
}
