//! End-to-end replay runs against an in-memory archive and a headless
//! device.

use std::sync::Arc;

use refire::archive::MemoryArchive;
use refire::descriptors::{
    ApplicationStateDesc, ComputePipelineDesc, GraphicsPipelineDesc, PipelineLayoutDesc,
    SamplerDesc, ShaderModuleDesc, StageDesc,
};
use refire::device::null::{DeviceEvent, NullDevice};
use refire::filter::ReplayFilter;
use refire::parser::RecordParser;
use refire::replay::ReplayConsumer;
use refire::{run_replay, Hash, ReplayOptions, Replayer, ResourceKind};

fn blob<T: serde::Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

fn shader_module_blob() -> Vec<u8> {
    blob(&ShaderModuleDesc {
        code: vec![0x0723_0203, 0x0001_0000],
    })
}

fn graphics_pipeline_blob(module: Hash, layout: Hash, render_pass: Hash) -> Vec<u8> {
    blob(&GraphicsPipelineDesc {
        stages: vec![StageDesc {
            stage: 0x1,
            module,
            name: "main".to_string(),
            ..Default::default()
        }],
        layout,
        render_pass,
        ..Default::default()
    })
}

fn compute_pipeline_blob(module: Hash, layout: Hash) -> Vec<u8> {
    blob(&ComputePipelineDesc {
        stage: StageDesc {
            stage: 0x20,
            module,
            name: "main".to_string(),
            ..Default::default()
        },
        layout,
        ..Default::default()
    })
}

fn replayer(device: &Arc<NullDevice>, num_threads: usize, loop_count: u32) -> Replayer {
    Replayer::new(
        device.clone(),
        ReplayFilter::all(),
        ReplayOptions {
            num_threads,
            loop_count,
        },
    )
}

fn creates_of(events: &[DeviceEvent], kind: ResourceKind) -> Vec<Hash> {
    events
        .iter()
        .filter_map(|event| match event {
            DeviceEvent::Create {
                kind: event_kind,
                hash,
                ..
            } if *event_kind == kind => Some(*hash),
            _ => None,
        })
        .collect()
}

#[test]
fn trivial_archive_builds_one_sampler() {
    let mut archive = MemoryArchive::new();
    archive.insert(
        ResourceKind::ApplicationInfo,
        0x1,
        blob(&ApplicationStateDesc::default()),
    );
    archive.insert(ResourceKind::Sampler, 0x01, blob(&SamplerDesc::default()));

    let device = Arc::new(NullDevice::new());
    let replayer = replayer(&device, 2, 1);
    let report = run_replay(&archive, &replayer).unwrap();

    assert_eq!(report.samplers, 1);
    assert_eq!(report.shader_modules, 0);
    assert_eq!(report.graphics_pipelines, 0);
    assert_eq!(report.compute_pipelines, 0);
    assert_eq!(report.stats.shader_modules.count, 0);
    assert!(device.events().contains(&DeviceEvent::Init));
}

#[test]
fn pipeline_sees_live_shader_module_handle() {
    let mut archive = MemoryArchive::new();
    archive.insert(ResourceKind::ShaderModule, 0xA, shader_module_blob());
    archive.insert(
        ResourceKind::PipelineLayout,
        0xB,
        blob(&PipelineLayoutDesc::default()),
    );
    archive.insert(
        ResourceKind::GraphicsPipeline,
        0xC,
        graphics_pipeline_blob(0xA, 0xB, 0),
    );

    let device = Arc::new(NullDevice::new());
    let replayer = replayer(&device, 8, 1);
    let report = run_replay(&archive, &replayer).unwrap();
    assert_eq!(report.graphics_pipelines, 1);

    let events = device.events();
    let module_handle = events
        .iter()
        .find_map(|event| match event {
            DeviceEvent::Create {
                kind: ResourceKind::ShaderModule,
                handle,
                ..
            } => Some(*handle),
            _ => None,
        })
        .expect("shader module was created");

    let pipeline_inputs = events
        .iter()
        .find_map(|event| match event {
            DeviceEvent::Create {
                kind: ResourceKind::GraphicsPipeline,
                inputs,
                ..
            } => Some(inputs.clone()),
            _ => None,
        })
        .expect("graphics pipeline was created");

    // The pipeline's module input must be the live module handle.
    assert_eq!(pipeline_inputs[0], module_handle);
    assert_ne!(pipeline_inputs[0], 0);
}

#[test]
fn graphics_filter_restricts_replay_and_nulls_outputs() {
    let device = Arc::new(NullDevice::new());
    let filter = ReplayFilter::new([0x2u64].into_iter().collect(), Default::default());
    let replayer = Replayer::new(
        device.clone(),
        filter,
        ReplayOptions {
            num_threads: 2,
            loop_count: 1,
        },
    );

    // Drive the parser by hand so the per-record output cells stay
    // inspectable.
    let mut parser = RecordParser::new();
    parser
        .parse(
            &replayer,
            ResourceKind::ShaderModule,
            0xA0,
            &shader_module_blob(),
        )
        .unwrap();
    parser
        .parse(
            &replayer,
            ResourceKind::PipelineLayout,
            0xB0,
            &blob(&PipelineLayoutDesc::default()),
        )
        .unwrap();
    replayer.sync();

    for hash in [0x1u64, 0x2, 0x3] {
        parser
            .parse(
                &replayer,
                ResourceKind::GraphicsPipeline,
                hash,
                &graphics_pipeline_blob(0xA0, 0xB0, 0),
            )
            .unwrap();
    }
    replayer.sync();

    assert_eq!(
        creates_of(&device.events(), ResourceKind::GraphicsPipeline),
        vec![0x2]
    );
    assert!(parser
        .output(ResourceKind::GraphicsPipeline, 0x1)
        .unwrap()
        .is_null());
    assert!(!parser
        .output(ResourceKind::GraphicsPipeline, 0x2)
        .unwrap()
        .is_null());
    assert!(parser
        .output(ResourceKind::GraphicsPipeline, 0x3)
        .unwrap()
        .is_null());
}

#[test]
fn loop_count_recreates_without_leaking() {
    let mut archive = MemoryArchive::new();
    archive.insert(ResourceKind::ShaderModule, 0xA, shader_module_blob());

    let device = Arc::new(NullDevice::new());
    {
        let replayer = replayer(&device, 1, 3);
        let report = run_replay(&archive, &replayer).unwrap();
        assert_eq!(report.shader_modules, 1);
        assert_eq!(report.stats.shader_modules.count, 3);

        let events = device.events();
        let creates = creates_of(&events, ResourceKind::ShaderModule);
        assert_eq!(creates.len(), 3);
        let destroys = events
            .iter()
            .filter(|event| matches!(event, DeviceEvent::Destroy { .. }))
            .count();
        assert_eq!(destroys, 2);

        // The surviving registry entry holds the third create's handle.
        let last_handle = events
            .iter()
            .rev()
            .find_map(|event| match event {
                DeviceEvent::Create { handle, .. } => Some(*handle),
                _ => None,
            })
            .unwrap();
        let entries = replayer.registry().entries(ResourceKind::ShaderModule);
        assert_eq!(entries, vec![(0xA, last_handle)]);
    }
    // Teardown released the survivor too.
    assert!(device.live_handles().is_empty());
}

#[test]
fn failed_create_is_isolated() {
    let mut archive = MemoryArchive::new();
    archive.insert(ResourceKind::ShaderModule, 0xA0, shader_module_blob());
    archive.insert(
        ResourceKind::PipelineLayout,
        0xB0,
        blob(&PipelineLayoutDesc::default()),
    );
    archive.insert(
        ResourceKind::GraphicsPipeline,
        0x1,
        graphics_pipeline_blob(0xA0, 0xB0, 0),
    );
    archive.insert(
        ResourceKind::GraphicsPipeline,
        0x2,
        graphics_pipeline_blob(0xA0, 0xB0, 0),
    );

    let device = Arc::new(NullDevice::new());
    device.fail_on(ResourceKind::GraphicsPipeline, 0x1);

    {
        let replayer = replayer(&device, 2, 1);
        let report = run_replay(&archive, &replayer).unwrap();

        assert_eq!(report.stats.graphics_pipelines.count, 1);
        assert_eq!(
            creates_of(&device.events(), ResourceKind::GraphicsPipeline),
            vec![0x2]
        );
        assert!(device
            .events()
            .contains(&DeviceEvent::CreateFailed {
                kind: ResourceKind::GraphicsPipeline,
                hash: 0x1,
            }));

        // The failed hash keeps a null registry entry.
        let mut entries = replayer.registry().entries(ResourceKind::GraphicsPipeline);
        entries.sort_unstable();
        assert_eq!(entries[0].0, 0x1);
        assert_eq!(entries[0].1, 0);
        assert_ne!(entries[1].1, 0);
    }
    assert!(device.live_handles().is_empty());
}

#[test]
fn no_pipeline_creates_before_last_shader_module() {
    let mut archive = MemoryArchive::new();
    for hash in 0..40u64 {
        archive.insert(ResourceKind::ShaderModule, 0x100 + hash, shader_module_blob());
    }
    archive.insert(
        ResourceKind::PipelineLayout,
        0xB0,
        blob(&PipelineLayoutDesc::default()),
    );
    for hash in 0..4u64 {
        archive.insert(
            ResourceKind::GraphicsPipeline,
            0x200 + hash,
            graphics_pipeline_blob(0x100 + hash, 0xB0, 0),
        );
        archive.insert(
            ResourceKind::ComputePipeline,
            0x300 + hash,
            compute_pipeline_blob(0x100 + hash, 0xB0),
        );
    }

    let device = Arc::new(NullDevice::new());
    let replayer = replayer(&device, 1, 1);
    run_replay(&archive, &replayer).unwrap();

    let events = device.events();
    let last_module_index = events
        .iter()
        .rposition(|event| {
            matches!(
                event,
                DeviceEvent::Create {
                    kind: ResourceKind::ShaderModule,
                    ..
                }
            )
        })
        .unwrap();
    let first_pipeline_index = events
        .iter()
        .position(|event| {
            matches!(
                event,
                DeviceEvent::Create {
                    kind: ResourceKind::GraphicsPipeline | ResourceKind::ComputePipeline,
                    ..
                }
            )
        })
        .unwrap();
    assert!(last_module_index < first_pipeline_index);
}

#[test]
fn malformed_record_is_skipped_and_replay_continues() {
    let mut archive = MemoryArchive::new();
    archive.insert(ResourceKind::Sampler, 0x1, b"{broken".to_vec());
    archive.insert(ResourceKind::Sampler, 0x2, blob(&SamplerDesc::default()));

    let device = Arc::new(NullDevice::new());
    let replayer = replayer(&device, 1, 1);
    let report = run_replay(&archive, &replayer).unwrap();

    assert_eq!(report.samplers, 1);
    assert_eq!(creates_of(&device.events(), ResourceKind::Sampler), vec![0x2]);
}
