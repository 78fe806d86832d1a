//! [`GpuDevice`] backed by a real Vulkan driver through ash.
//!
//! The instance and device are created lazily on the first use so that the
//! captured application info can steer device creation. After
//! initialization the device state is immutable and shared with the worker
//! threads without locking.

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use ash::vk;

use crate::descriptors::{
    ApplicationInfoDesc, DeviceFeaturesDesc, RenderPassDesc, ResolvedComputePipeline,
    ResolvedGraphicsPipeline, ResolvedPipelineLayout, ResolvedSetLayout, SamplerDesc,
    ShaderModuleDesc,
};
use crate::device::{DeviceError, GpuDevice, RawHandle};
use crate::{Hash, ResourceKind};

const VALIDATION_LAYER: &[u8] = b"VK_LAYER_KHRONOS_validation\0";

/// Size of the canonical `vkGetPipelineCacheData` header:
/// length, version, vendorID, deviceID (u32 each) plus the cache UUID.
pub const PIPELINE_CACHE_HEADER_SIZE: usize = 16 + vk::UUID_SIZE;
const_assert_eq!(PIPELINE_CACHE_HEADER_SIZE, 32);

#[derive(Debug, Clone, Default)]
pub struct VulkanDeviceConfig {
    pub device_index: usize,
    pub enable_validation: bool,
    pub pipeline_cache: bool,
    pub on_disk_pipeline_cache_path: Option<PathBuf>,
}

/// Parsed on-disk pipeline cache header (little-endian).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PipelineCacheHeader {
    pub length: u32,
    pub version: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub cache_uuid: [u8; vk::UUID_SIZE],
}

impl PipelineCacheHeader {
    pub fn parse(blob: &[u8]) -> Option<Self> {
        if blob.len() < PIPELINE_CACHE_HEADER_SIZE {
            return None;
        }

        let read_le = |offset: usize| -> u32 {
            u32::from_le_bytes([
                blob[offset],
                blob[offset + 1],
                blob[offset + 2],
                blob[offset + 3],
            ])
        };

        let mut cache_uuid = [0u8; vk::UUID_SIZE];
        cache_uuid.copy_from_slice(&blob[16..16 + vk::UUID_SIZE]);

        Some(Self {
            length: read_le(0),
            version: read_le(4),
            vendor_id: read_le(8),
            device_id: read_le(12),
            cache_uuid,
        })
    }

    /// Validates the header against the live device. A mismatching blob is
    /// unusable as initial cache data.
    pub fn matches_device(&self, properties: &vk::PhysicalDeviceProperties) -> bool {
        if self.length as usize != PIPELINE_CACHE_HEADER_SIZE {
            log::info!("Length of pipeline cache header is not as expected.");
            return false;
        }
        if self.version != vk::PipelineCacheHeaderVersion::ONE.as_raw() as u32 {
            log::info!("Version of pipeline cache header is not 1.");
            return false;
        }
        if self.vendor_id != properties.vendor_id {
            log::info!("Mismatch of vendorID and cache vendorID.");
            return false;
        }
        if self.device_id != properties.device_id {
            log::info!("Mismatch of deviceID and cache deviceID.");
            return false;
        }
        if self.cache_uuid != properties.pipeline_cache_uuid {
            log::info!("Mismatch between pipelineCacheUUID.");
            return false;
        }
        true
    }
}

struct DeviceState {
    _entry: ash::Entry,
    instance: ash::Instance,
    device: ash::Device,
    pipeline_cache: vk::PipelineCache,
}

pub struct VulkanDevice {
    config: VulkanDeviceConfig,
    state: OnceLock<DeviceState>,
    init_lock: Mutex<()>,
}

impl VulkanDevice {
    pub fn new(config: VulkanDeviceConfig) -> Self {
        Self {
            config,
            state: OnceLock::new(),
            init_lock: Mutex::new(()),
        }
    }

    fn state(&self) -> Result<&DeviceState, DeviceError> {
        self.ensure_init(&ApplicationInfoDesc::default(), &DeviceFeaturesDesc::default())
    }

    fn ensure_init(
        &self,
        app: &ApplicationInfoDesc,
        features: &DeviceFeaturesDesc,
    ) -> Result<&DeviceState, DeviceError> {
        if let Some(state) = self.state.get() {
            return Ok(state);
        }

        let _guard = self.init_lock.lock().unwrap();
        if let Some(state) = self.state.get() {
            return Ok(state);
        }

        let state = self.init_device(app, features)?;
        Ok(self.state.get_or_init(|| state))
    }

    fn init_device(
        &self,
        app: &ApplicationInfoDesc,
        features: &DeviceFeaturesDesc,
    ) -> Result<DeviceState, DeviceError> {
        let start = std::time::Instant::now();
        let entry = unsafe { ash::Entry::load() }.map_err(DeviceError::Loading)?;

        let application_name = app
            .application_name
            .as_deref()
            .map(|name| CString::new(name).unwrap_or_default())
            .unwrap_or_default();
        let engine_name = app
            .engine_name
            .as_deref()
            .map(|name| CString::new(name).unwrap_or_default())
            .unwrap_or_default();

        let api_version = if app.api_version != 0 {
            app.api_version
        } else {
            vk::API_VERSION_1_1
        };

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&application_name)
            .application_version(app.application_version)
            .engine_name(&engine_name)
            .engine_version(app.engine_version)
            .api_version(api_version);

        let mut layers: Vec<*const c_char> = Vec::new();
        if self.config.enable_validation {
            layers.push(VALIDATION_LAYER.as_ptr() as *const c_char);
        }

        let instance_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        let physical_devices = unsafe { instance.enumerate_physical_devices()? };
        if physical_devices.is_empty() {
            unsafe { instance.destroy_instance(None) };
            return Err(DeviceError::NoSupportedDevice);
        }
        let physical_device = match physical_devices.get(self.config.device_index) {
            Some(physical_device) => *physical_device,
            None => {
                unsafe { instance.destroy_instance(None) };
                return Err(DeviceError::InvalidDeviceIndex(self.config.device_index));
            }
        };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let device_name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };
        log::info!(
            "Replaying on device {:?} (vendor {:#06x}, device {:#06x})",
            device_name,
            properties.vendor_id,
            properties.device_id
        );

        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let queue_family_index = queue_families
            .iter()
            .position(|family| {
                family
                    .queue_flags
                    .intersects(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            })
            .unwrap_or(0) as u32;

        let priority = 1f32;
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .queue_priorities(std::slice::from_ref(&priority));

        let enabled_features = vk::PhysicalDeviceFeatures {
            robust_buffer_access: features.robust_buffer_access as vk::Bool32,
            full_draw_index_uint32: features.full_draw_index_uint32 as vk::Bool32,
            independent_blend: features.independent_blend as vk::Bool32,
            sampler_anisotropy: features.sampler_anisotropy as vk::Bool32,
            fragment_stores_and_atomics: features.fragment_stores_and_atomics as vk::Bool32,
            shader_int64: features.shader_int64 as vk::Bool32,
            shader_int16: features.shader_int16 as vk::Bool32,
            ..Default::default()
        };

        let device_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_info))
            .enabled_features(&enabled_features);

        let device = match unsafe { instance.create_device(physical_device, &device_info, None) } {
            Ok(device) => device,
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                return Err(DeviceError::Vulkan(err));
            }
        };

        let pipeline_cache = if self.config.pipeline_cache {
            self.create_pipeline_cache(&device, &properties)
        } else {
            vk::PipelineCache::null()
        };

        log::info!("Creating Vulkan device took: {} ms", start.elapsed().as_millis());

        Ok(DeviceState {
            _entry: entry,
            instance,
            device,
            pipeline_cache,
        })
    }

    /// Creates the pipeline cache, seeded from disk when a valid blob for
    /// this device exists. Falls back to a blank cache on any failure.
    fn create_pipeline_cache(
        &self,
        device: &ash::Device,
        properties: &vk::PhysicalDeviceProperties,
    ) -> vk::PipelineCache {
        let mut initial_data = Vec::new();
        if let Some(path) = &self.config.on_disk_pipeline_cache_path {
            match std::fs::read(path) {
                Ok(blob) => match PipelineCacheHeader::parse(&blob) {
                    Some(header) if header.matches_device(properties) => initial_data = blob,
                    Some(_) => {
                        log::info!("Failed to validate pipeline cache. Creating a blank one.")
                    }
                    None => log::info!("Pipeline cache header is too small."),
                },
                Err(err) => {
                    log::info!("No usable on-disk pipeline cache ({}). Creating a blank one.", err)
                }
            }
        }

        let info = vk::PipelineCacheCreateInfo::builder().initial_data(&initial_data);
        match unsafe { device.create_pipeline_cache(&info, None) } {
            Ok(cache) => cache,
            Err(_) => {
                log::error!("Failed to create pipeline cache, trying to create a blank one.");
                let blank = vk::PipelineCacheCreateInfo::builder();
                unsafe { device.create_pipeline_cache(&blank, None) }.unwrap_or_else(|_| {
                    log::error!("Failed to create pipeline cache.");
                    vk::PipelineCache::null()
                })
            }
        }
    }
}

impl GpuDevice for VulkanDevice {
    fn set_application_info(
        &self,
        app: &ApplicationInfoDesc,
        features: &DeviceFeaturesDesc,
    ) -> Result<(), DeviceError> {
        if self.state.get().is_some() {
            return Ok(());
        }
        self.ensure_init(app, features)?;

        log::info!("Replaying for application:");
        log::info!(
            "  apiVersion: {}.{}.{}",
            vk::api_version_major(app.api_version),
            vk::api_version_minor(app.api_version),
            vk::api_version_patch(app.api_version)
        );
        log::info!("  engineVersion: {}", app.engine_version);
        log::info!("  applicationVersion: {}", app.application_version);
        if let Some(name) = &app.engine_name {
            log::info!("  engineName: {}", name);
        }
        if let Some(name) = &app.application_name {
            log::info!("  applicationName: {}", name);
        }
        Ok(())
    }

    fn create_sampler(&self, _hash: Hash, desc: &SamplerDesc) -> Result<RawHandle, DeviceError> {
        let state = self.state()?;

        let info = vk::SamplerCreateInfo::builder()
            .flags(vk::SamplerCreateFlags::from_raw(desc.flags))
            .mag_filter(vk::Filter::from_raw(desc.mag_filter))
            .min_filter(vk::Filter::from_raw(desc.min_filter))
            .mipmap_mode(vk::SamplerMipmapMode::from_raw(desc.mipmap_mode))
            .address_mode_u(vk::SamplerAddressMode::from_raw(desc.address_mode_u))
            .address_mode_v(vk::SamplerAddressMode::from_raw(desc.address_mode_v))
            .address_mode_w(vk::SamplerAddressMode::from_raw(desc.address_mode_w))
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(desc.anisotropy_enable)
            .max_anisotropy(desc.max_anisotropy)
            .compare_enable(desc.compare_enable)
            .compare_op(vk::CompareOp::from_raw(desc.compare_op))
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(vk::BorderColor::from_raw(desc.border_color))
            .unnormalized_coordinates(desc.unnormalized_coordinates);

        let sampler = unsafe { state.device.create_sampler(&info, None)? };
        Ok(vk::Handle::as_raw(sampler))
    }

    fn create_descriptor_set_layout(
        &self,
        _hash: Hash,
        desc: &ResolvedSetLayout,
    ) -> Result<RawHandle, DeviceError> {
        let state = self.state()?;

        let immutable_samplers: Vec<Vec<vk::Sampler>> = desc
            .immutable_samplers
            .iter()
            .map(|samplers| {
                samplers
                    .iter()
                    .map(|handle| vk::Handle::from_raw(*handle))
                    .collect()
            })
            .collect();

        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .desc
            .bindings
            .iter()
            .zip(&immutable_samplers)
            .map(|(binding, samplers)| {
                let mut builder = vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(vk::DescriptorType::from_raw(binding.descriptor_type))
                    .descriptor_count(binding.descriptor_count)
                    .stage_flags(vk::ShaderStageFlags::from_raw(binding.stage_flags));
                if !samplers.is_empty() {
                    builder = builder.immutable_samplers(samplers);
                }
                builder.build()
            })
            .collect();

        let info = vk::DescriptorSetLayoutCreateInfo::builder()
            .flags(vk::DescriptorSetLayoutCreateFlags::from_raw(desc.desc.flags))
            .bindings(&bindings);

        let layout = unsafe { state.device.create_descriptor_set_layout(&info, None)? };
        Ok(vk::Handle::as_raw(layout))
    }

    fn create_pipeline_layout(
        &self,
        _hash: Hash,
        desc: &ResolvedPipelineLayout,
    ) -> Result<RawHandle, DeviceError> {
        let state = self.state()?;

        let set_layouts: Vec<vk::DescriptorSetLayout> = desc
            .set_layouts
            .iter()
            .map(|handle| vk::Handle::from_raw(*handle))
            .collect();

        let push_constant_ranges: Vec<vk::PushConstantRange> = desc
            .desc
            .push_constant_ranges
            .iter()
            .map(|range| vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::from_raw(range.stage_flags),
                offset: range.offset,
                size: range.size,
            })
            .collect();

        let info = vk::PipelineLayoutCreateInfo::builder()
            .flags(vk::PipelineLayoutCreateFlags::from_raw(desc.desc.flags))
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_constant_ranges);

        let layout = unsafe { state.device.create_pipeline_layout(&info, None)? };
        Ok(vk::Handle::as_raw(layout))
    }

    fn create_render_pass(
        &self,
        _hash: Hash,
        desc: &RenderPassDesc,
    ) -> Result<RawHandle, DeviceError> {
        let state = self.state()?;

        let attachments: Vec<vk::AttachmentDescription> = desc
            .attachments
            .iter()
            .map(|attachment| vk::AttachmentDescription {
                flags: vk::AttachmentDescriptionFlags::from_raw(attachment.flags),
                format: vk::Format::from_raw(attachment.format),
                samples: vk::SampleCountFlags::from_raw(attachment.samples),
                load_op: vk::AttachmentLoadOp::from_raw(attachment.load_op),
                store_op: vk::AttachmentStoreOp::from_raw(attachment.store_op),
                stencil_load_op: vk::AttachmentLoadOp::from_raw(attachment.stencil_load_op),
                stencil_store_op: vk::AttachmentStoreOp::from_raw(attachment.stencil_store_op),
                initial_layout: vk::ImageLayout::from_raw(attachment.initial_layout),
                final_layout: vk::ImageLayout::from_raw(attachment.final_layout),
            })
            .collect();

        let to_refs = |refs: &[crate::descriptors::AttachmentRefDesc]| -> Vec<vk::AttachmentReference> {
            refs.iter()
                .map(|reference| vk::AttachmentReference {
                    attachment: reference.attachment,
                    layout: vk::ImageLayout::from_raw(reference.layout),
                })
                .collect()
        };

        struct SubpassStorage {
            input: Vec<vk::AttachmentReference>,
            color: Vec<vk::AttachmentReference>,
            resolve: Vec<vk::AttachmentReference>,
            depth_stencil: Option<vk::AttachmentReference>,
            preserve: Vec<u32>,
        }

        let storage: Vec<SubpassStorage> = desc
            .subpasses
            .iter()
            .map(|subpass| SubpassStorage {
                input: to_refs(&subpass.input_attachments),
                color: to_refs(&subpass.color_attachments),
                resolve: to_refs(&subpass.resolve_attachments),
                depth_stencil: subpass.depth_stencil_attachment.as_ref().map(|reference| {
                    vk::AttachmentReference {
                        attachment: reference.attachment,
                        layout: vk::ImageLayout::from_raw(reference.layout),
                    }
                }),
                preserve: subpass.preserve_attachments.clone(),
            })
            .collect();

        let subpasses: Vec<vk::SubpassDescription> = desc
            .subpasses
            .iter()
            .zip(&storage)
            .map(|(subpass, storage)| {
                let mut builder = vk::SubpassDescription::builder()
                    .pipeline_bind_point(vk::PipelineBindPoint::from_raw(
                        subpass.pipeline_bind_point,
                    ))
                    .input_attachments(&storage.input)
                    .color_attachments(&storage.color)
                    .preserve_attachments(&storage.preserve);
                if !storage.resolve.is_empty() {
                    builder = builder.resolve_attachments(&storage.resolve);
                }
                if let Some(depth_stencil) = &storage.depth_stencil {
                    builder = builder.depth_stencil_attachment(depth_stencil);
                }
                builder.build()
            })
            .collect();

        let dependencies: Vec<vk::SubpassDependency> = desc
            .dependencies
            .iter()
            .map(|dependency| vk::SubpassDependency {
                src_subpass: dependency.src_subpass,
                dst_subpass: dependency.dst_subpass,
                src_stage_mask: vk::PipelineStageFlags::from_raw(dependency.src_stage_mask),
                dst_stage_mask: vk::PipelineStageFlags::from_raw(dependency.dst_stage_mask),
                src_access_mask: vk::AccessFlags::from_raw(dependency.src_access_mask),
                dst_access_mask: vk::AccessFlags::from_raw(dependency.dst_access_mask),
                dependency_flags: vk::DependencyFlags::from_raw(dependency.dependency_flags),
            })
            .collect();

        let info = vk::RenderPassCreateInfo::builder()
            .flags(vk::RenderPassCreateFlags::from_raw(desc.flags))
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { state.device.create_render_pass(&info, None)? };
        Ok(vk::Handle::as_raw(render_pass))
    }

    fn create_shader_module(
        &self,
        _hash: Hash,
        desc: &ShaderModuleDesc,
    ) -> Result<RawHandle, DeviceError> {
        let state = self.state()?;

        let info = vk::ShaderModuleCreateInfo::builder().code(&desc.code);
        let module = unsafe { state.device.create_shader_module(&info, None)? };
        Ok(vk::Handle::as_raw(module))
    }

    fn create_graphics_pipeline(
        &self,
        _hash: Hash,
        desc: &ResolvedGraphicsPipeline,
    ) -> Result<RawHandle, DeviceError> {
        let state = self.state()?;

        let entry_names: Vec<CString> = desc
            .desc
            .stages
            .iter()
            .map(|stage| CString::new(stage.name.as_str()).unwrap_or_default())
            .collect();

        let stages: Vec<vk::PipelineShaderStageCreateInfo> = desc
            .desc
            .stages
            .iter()
            .zip(&desc.stage_modules)
            .zip(&entry_names)
            .map(|((stage, module), name)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .flags(vk::PipelineShaderStageCreateFlags::from_raw(stage.flags))
                    .stage(vk::ShaderStageFlags::from_raw(stage.stage))
                    .module(vk::Handle::from_raw(*module))
                    .name(name)
                    .build()
            })
            .collect();

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .desc
            .vertex_input
            .bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: vk::VertexInputRate::from_raw(binding.input_rate),
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .desc
            .vertex_input
            .attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: vk::Format::from_raw(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::from_raw(
                desc.desc.input_assembly.topology,
            ))
            .primitive_restart_enable(desc.desc.input_assembly.primitive_restart_enable);

        let tessellation = desc.desc.tessellation.as_ref().map(|tessellation| {
            vk::PipelineTessellationStateCreateInfo::builder()
                .patch_control_points(tessellation.patch_control_points)
                .build()
        });

        let viewport = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(desc.desc.viewport.viewport_count)
            .scissor_count(desc.desc.viewport.scissor_count);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(desc.desc.rasterization.depth_clamp_enable)
            .rasterizer_discard_enable(desc.desc.rasterization.rasterizer_discard_enable)
            .polygon_mode(vk::PolygonMode::from_raw(
                desc.desc.rasterization.polygon_mode,
            ))
            .cull_mode(vk::CullModeFlags::from_raw(desc.desc.rasterization.cull_mode))
            .front_face(vk::FrontFace::from_raw(desc.desc.rasterization.front_face))
            .depth_bias_enable(desc.desc.rasterization.depth_bias_enable)
            .depth_bias_constant_factor(desc.desc.rasterization.depth_bias_constant_factor)
            .depth_bias_clamp(desc.desc.rasterization.depth_bias_clamp)
            .depth_bias_slope_factor(desc.desc.rasterization.depth_bias_slope_factor)
            .line_width(desc.desc.rasterization.line_width);

        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::from_raw(
                desc.desc.multisample.rasterization_samples,
            ))
            .sample_shading_enable(desc.desc.multisample.sample_shading_enable)
            .min_sample_shading(desc.desc.multisample.min_sample_shading)
            .alpha_to_coverage_enable(desc.desc.multisample.alpha_to_coverage_enable)
            .alpha_to_one_enable(desc.desc.multisample.alpha_to_one_enable);

        let depth_stencil = desc.desc.depth_stencil.as_ref().map(|depth_stencil| {
            let stencil_op = |op: &crate::descriptors::StencilOpStateDesc| vk::StencilOpState {
                fail_op: vk::StencilOp::from_raw(op.fail_op),
                pass_op: vk::StencilOp::from_raw(op.pass_op),
                depth_fail_op: vk::StencilOp::from_raw(op.depth_fail_op),
                compare_op: vk::CompareOp::from_raw(op.compare_op),
                compare_mask: op.compare_mask,
                write_mask: op.write_mask,
                reference: op.reference,
            };
            vk::PipelineDepthStencilStateCreateInfo::builder()
                .depth_test_enable(depth_stencil.depth_test_enable)
                .depth_write_enable(depth_stencil.depth_write_enable)
                .depth_compare_op(vk::CompareOp::from_raw(depth_stencil.depth_compare_op))
                .depth_bounds_test_enable(depth_stencil.depth_bounds_test_enable)
                .stencil_test_enable(depth_stencil.stencil_test_enable)
                .front(stencil_op(&depth_stencil.front))
                .back(stencil_op(&depth_stencil.back))
                .min_depth_bounds(depth_stencil.min_depth_bounds)
                .max_depth_bounds(depth_stencil.max_depth_bounds)
                .build()
        });

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
            .desc
            .color_blend
            .as_ref()
            .map(|blend| {
                blend
                    .attachments
                    .iter()
                    .map(|attachment| vk::PipelineColorBlendAttachmentState {
                        blend_enable: attachment.blend_enable as vk::Bool32,
                        src_color_blend_factor: vk::BlendFactor::from_raw(
                            attachment.src_color_blend_factor,
                        ),
                        dst_color_blend_factor: vk::BlendFactor::from_raw(
                            attachment.dst_color_blend_factor,
                        ),
                        color_blend_op: vk::BlendOp::from_raw(attachment.color_blend_op),
                        src_alpha_blend_factor: vk::BlendFactor::from_raw(
                            attachment.src_alpha_blend_factor,
                        ),
                        dst_alpha_blend_factor: vk::BlendFactor::from_raw(
                            attachment.dst_alpha_blend_factor,
                        ),
                        alpha_blend_op: vk::BlendOp::from_raw(attachment.alpha_blend_op),
                        color_write_mask: vk::ColorComponentFlags::from_raw(
                            attachment.color_write_mask,
                        ),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let color_blend = desc.desc.color_blend.as_ref().map(|blend| {
            vk::PipelineColorBlendStateCreateInfo::builder()
                .logic_op_enable(blend.logic_op_enable)
                .logic_op(vk::LogicOp::from_raw(blend.logic_op))
                .attachments(&blend_attachments)
                .blend_constants(blend.blend_constants)
                .build()
        });

        let dynamic_states: Vec<vk::DynamicState> = desc
            .desc
            .dynamic_states
            .iter()
            .map(|state| vk::DynamicState::from_raw(*state))
            .collect();
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let mut info = vk::GraphicsPipelineCreateInfo::builder()
            .flags(vk::PipelineCreateFlags::from_raw(desc.desc.flags))
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .dynamic_state(&dynamic_state)
            .layout(vk::Handle::from_raw(desc.layout))
            .render_pass(vk::Handle::from_raw(desc.render_pass))
            .subpass(desc.desc.subpass);
        if let Some(tessellation) = &tessellation {
            info = info.tessellation_state(tessellation);
        }
        if let Some(depth_stencil) = &depth_stencil {
            info = info.depth_stencil_state(depth_stencil);
        }
        if let Some(color_blend) = &color_blend {
            info = info.color_blend_state(color_blend);
        }

        let pipelines = unsafe {
            state.device.create_graphics_pipelines(
                state.pipeline_cache,
                std::slice::from_ref(&info),
                None,
            )
        }
        .map_err(|(_, err)| DeviceError::Vulkan(err))?;

        Ok(vk::Handle::as_raw(pipelines[0]))
    }

    fn create_compute_pipeline(
        &self,
        _hash: Hash,
        desc: &ResolvedComputePipeline,
    ) -> Result<RawHandle, DeviceError> {
        let state = self.state()?;

        let entry_name = CString::new(desc.desc.stage.name.as_str()).unwrap_or_default();
        let stage = vk::PipelineShaderStageCreateInfo::builder()
            .flags(vk::PipelineShaderStageCreateFlags::from_raw(
                desc.desc.stage.flags,
            ))
            .stage(vk::ShaderStageFlags::from_raw(desc.desc.stage.stage))
            .module(vk::Handle::from_raw(desc.module))
            .name(&entry_name);

        let info = vk::ComputePipelineCreateInfo::builder()
            .flags(vk::PipelineCreateFlags::from_raw(desc.desc.flags))
            .stage(stage.build())
            .layout(vk::Handle::from_raw(desc.layout));

        let pipelines = unsafe {
            state.device.create_compute_pipelines(
                state.pipeline_cache,
                std::slice::from_ref(&info),
                None,
            )
        }
        .map_err(|(_, err)| DeviceError::Vulkan(err))?;

        Ok(vk::Handle::as_raw(pipelines[0]))
    }

    fn destroy(&self, kind: ResourceKind, handle: RawHandle) {
        let state = match self.state.get() {
            Some(state) => state,
            None => return,
        };

        unsafe {
            match kind {
                ResourceKind::Sampler => state
                    .device
                    .destroy_sampler(vk::Handle::from_raw(handle), None),
                ResourceKind::DescriptorSetLayout => state
                    .device
                    .destroy_descriptor_set_layout(vk::Handle::from_raw(handle), None),
                ResourceKind::PipelineLayout => state
                    .device
                    .destroy_pipeline_layout(vk::Handle::from_raw(handle), None),
                ResourceKind::RenderPass => state
                    .device
                    .destroy_render_pass(vk::Handle::from_raw(handle), None),
                ResourceKind::ShaderModule => state
                    .device
                    .destroy_shader_module(vk::Handle::from_raw(handle), None),
                ResourceKind::GraphicsPipeline | ResourceKind::ComputePipeline => {
                    state.device.destroy_pipeline(vk::Handle::from_raw(handle), None)
                }
                ResourceKind::ApplicationInfo => {}
            }
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        let state = match self.state.get() {
            Some(state) => state,
            None => return,
        };

        if state.pipeline_cache != vk::PipelineCache::null() {
            if let Some(path) = &self.config.on_disk_pipeline_cache_path {
                match unsafe { state.device.get_pipeline_cache_data(state.pipeline_cache) } {
                    Ok(blob) => {
                        if let Err(err) = std::fs::write(path, &blob) {
                            log::error!("Failed to write pipeline cache data to disk: {}", err);
                        }
                    }
                    Err(err) => {
                        log::error!("Failed to query pipeline cache data: {:?}", err);
                    }
                }
            }
            unsafe { state.device.destroy_pipeline_cache(state.pipeline_cache, None) };
        }

        unsafe {
            state.device.destroy_device(None);
            state.instance.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(length: u32, version: u32, vendor: u32, device: u32, uuid: u8) -> Vec<u8> {
        let mut blob = Vec::new();
        blob.extend_from_slice(&length.to_le_bytes());
        blob.extend_from_slice(&version.to_le_bytes());
        blob.extend_from_slice(&vendor.to_le_bytes());
        blob.extend_from_slice(&device.to_le_bytes());
        blob.extend_from_slice(&[uuid; vk::UUID_SIZE]);
        blob
    }

    fn properties(vendor: u32, device: u32, uuid: u8) -> vk::PhysicalDeviceProperties {
        vk::PhysicalDeviceProperties {
            vendor_id: vendor,
            device_id: device,
            pipeline_cache_uuid: [uuid; vk::UUID_SIZE],
            ..Default::default()
        }
    }

    #[test]
    fn parse_rejects_short_blob() {
        assert!(PipelineCacheHeader::parse(&[0u8; 31]).is_none());
    }

    #[test]
    fn header_roundtrip() {
        let blob = header_bytes(32, 1, 0x10de, 0x2204, 0xAB);
        let header = PipelineCacheHeader::parse(&blob).unwrap();
        assert_eq!(header.length, 32);
        assert_eq!(header.version, 1);
        assert_eq!(header.vendor_id, 0x10de);
        assert_eq!(header.device_id, 0x2204);
        assert_eq!(header.cache_uuid, [0xAB; vk::UUID_SIZE]);
    }

    #[test]
    fn matching_header_is_accepted() {
        let blob = header_bytes(32, 1, 0x1002, 0x73bf, 0x11);
        let header = PipelineCacheHeader::parse(&blob).unwrap();
        assert!(header.matches_device(&properties(0x1002, 0x73bf, 0x11)));
    }

    #[test]
    fn mismatched_header_is_rejected() {
        let props = properties(0x1002, 0x73bf, 0x11);

        let wrong_length = PipelineCacheHeader::parse(&header_bytes(24, 1, 0x1002, 0x73bf, 0x11));
        assert!(!wrong_length.unwrap().matches_device(&props));

        let wrong_version = PipelineCacheHeader::parse(&header_bytes(32, 2, 0x1002, 0x73bf, 0x11));
        assert!(!wrong_version.unwrap().matches_device(&props));

        let wrong_vendor = PipelineCacheHeader::parse(&header_bytes(32, 1, 0x10de, 0x73bf, 0x11));
        assert!(!wrong_vendor.unwrap().matches_device(&props));

        let wrong_device = PipelineCacheHeader::parse(&header_bytes(32, 1, 0x1002, 0x1111, 0x11));
        assert!(!wrong_device.unwrap().matches_device(&props));

        let wrong_uuid = PipelineCacheHeader::parse(&header_bytes(32, 1, 0x1002, 0x73bf, 0x22));
        assert!(!wrong_uuid.unwrap().matches_device(&props));
    }
}
