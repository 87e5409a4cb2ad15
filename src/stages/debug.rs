use std::{any::Any, mem};

use cgmath::Point3;

use crate::{
    data_structures::model::Vertex,
    gpu::{BufferDesc, GpuDevice, PipelineKey},
    render::DrawCommand,
    settings::RenderSettings,
    stages::{RenderStage, StageContext, StageKind, prepare_pipelines},
};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LineVertex {
    pub position: [f32; 3],
    pub colour: [f32; 4],
}

impl Vertex for LineVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<LineVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// Flat-coloured line lists queued for the next frame only.
///
/// Every `add_*` call becomes one vertex buffer, drawn once and destroyed
/// after the frame executes; the queue is empty again afterwards.
#[derive(Debug, Default)]
pub struct DebugStage {
    pending: Vec<Vec<LineVertex>>,
}

impl DebugStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn add_line(&mut self, from: Point3<f32>, to: Point3<f32>, colour: [f32; 4]) {
        self.add_lines(&[(from, to)], colour);
    }

    pub fn add_lines(&mut self, lines: &[(Point3<f32>, Point3<f32>)], colour: [f32; 4]) {
        if lines.is_empty() {
            return;
        }
        self.pending.push(
            lines
                .iter()
                .flat_map(|(from, to)| {
                    [
                        LineVertex {
                            position: (*from).into(),
                            colour,
                        },
                        LineVertex {
                            position: (*to).into(),
                            colour,
                        },
                    ]
                })
                .collect(),
        );
    }

    /// The twelve edges of an axis aligned box.
    pub fn add_box(&mut self, min: Point3<f32>, max: Point3<f32>, colour: [f32; 4]) {
        let corner = |i: usize| {
            Point3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        #[rustfmt::skip]
        const EDGES: [(usize, usize); 12] = [
            (0, 1), (2, 3), (4, 5), (6, 7),
            (0, 2), (1, 3), (4, 6), (5, 7),
            (0, 4), (1, 5), (2, 6), (3, 7),
        ];
        let lines: Vec<_> = EDGES.iter().map(|(a, b)| (corner(*a), corner(*b))).collect();
        self.add_lines(&lines, colour);
    }
}

impl RenderStage for DebugStage {
    fn kind(&self) -> StageKind {
        StageKind::Debug
    }

    fn initialize(&mut self, device: &mut dyn GpuDevice, _settings: &RenderSettings) {
        prepare_pipelines(device, [PipelineKey::DebugLines]);
    }

    fn render(&mut self, ctx: &mut StageContext<'_>) {
        if self.pending.is_empty() {
            return;
        }
        ctx.bind(PipelineKey::DebugLines);
        for vertices in self.pending.drain(..) {
            let buffer = ctx.device.create_buffer(&BufferDesc {
                label: "Debug Line Buffer",
                size: mem::size_of_val(vertices.as_slice()) as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            });
            ctx.device
                .write_buffer(buffer, 0, bytemuck::cast_slice(&vertices));
            ctx.frame.track_transient(buffer);
            ctx.frame.push(DrawCommand::Lines {
                buffer,
                vertex_count: vertices.len() as u32,
            });
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
