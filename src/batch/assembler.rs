//! Writes transformed mesh channels into a reserved buffer region.
//!
//! A shader's [`VertexLayout`] is resolved once, when the shader is bound,
//! into a list of [`AttributeWriter`]s. Assembling a draw command then walks
//! that list and runs one tight loop per attribute over the reserved
//! destination bytes. Layout entries the assembler cannot produce are
//! rejected at resolve time, so a declared attribute is never skipped.

use bytemuck::Pod;
use glam::{Mat3, Mat4, Vec2, Vec4};

use super::buffer::Reservation;
use crate::error::{RenderError, RenderResult};
use crate::resources::{AttributeFormat, AttributeSemantic, Colors, Mesh, VertexLayout};

/// Where and how one layout attribute is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeWriter {
    /// float2 position, transformed by the command matrix
    Position2 { stream: usize, offset: usize },
    /// float3 position, transformed by the command matrix
    Position3 { stream: usize, offset: usize },
    /// float3 normal, transformed by the inverse-transpose of the matrix
    Normal3 { stream: usize, offset: usize },
    /// 1 to 4 color channels, multiplied by the command tint
    Color {
        channels: usize,
        stream: usize,
        offset: usize,
    },
    /// float2 texture coordinates, copied verbatim
    TexCoord2 { stream: usize, offset: usize },
}

/// Resolve a shader layout into writers, in declaration order.
pub fn resolve_layout(layout: &VertexLayout) -> RenderResult<Vec<AttributeWriter>> {
    layout.validate().map_err(RenderError::InvalidConfig)?;

    layout
        .attributes
        .iter()
        .enumerate()
        .map(|(slot, attr)| {
            let stream = attr.buffer_index as usize;
            let offset = attr.offset as usize;
            let writer = match (attr.semantic, attr.format) {
                (AttributeSemantic::Position, AttributeFormat::Float2) => {
                    AttributeWriter::Position2 { stream, offset }
                }
                (AttributeSemantic::Position, AttributeFormat::Float3) => {
                    AttributeWriter::Position3 { stream, offset }
                }
                (AttributeSemantic::Normal, AttributeFormat::Float3) => {
                    AttributeWriter::Normal3 { stream, offset }
                }
                (AttributeSemantic::TexCoord0, AttributeFormat::Float2) => {
                    AttributeWriter::TexCoord2 { stream, offset }
                }
                (AttributeSemantic::Color, format) => match format.float_components() {
                    Some(channels) => AttributeWriter::Color {
                        channels,
                        stream,
                        offset,
                    },
                    None => return Err(unsupported(slot, attr.semantic, format)),
                },
                (semantic, format) => return Err(unsupported(slot, semantic, format)),
            };
            Ok(writer)
        })
        .collect()
}

fn unsupported(slot: usize, semantic: AttributeSemantic, format: AttributeFormat) -> RenderError {
    RenderError::UnsupportedAttribute {
        slot,
        semantic,
        format,
    }
}

/// Check the preconditions [`assemble`] relies on.
///
/// Only looks at channel lengths, so it is cheap enough to run for every
/// command, including ones served from the cache.
pub fn check_mesh(mesh: &Mesh) -> RenderResult<()> {
    let data = mesh.data();
    let vertices = data.positions.len();
    let malformed = |reason: String| RenderError::MalformedMesh {
        mesh: mesh.id(),
        reason,
    };

    if data.indices.len() % 3 != 0 {
        return Err(malformed(format!(
            "index count {} is not a multiple of 3",
            data.indices.len()
        )));
    }
    if let Some(normals) = &data.normals {
        if normals.len() != vertices {
            return Err(malformed(format!("{} normals for {vertices} vertices", normals.len())));
        }
    }
    if let Some(colors) = &data.colors {
        if colors.len() != vertices {
            return Err(malformed(format!("{} colors for {vertices} vertices", colors.len())));
        }
    }
    if let Some(uvs) = &data.tex_coords {
        if uvs.len() != vertices {
            return Err(malformed(format!("{} texcoords for {vertices} vertices", uvs.len())));
        }
    }
    Ok(())
}

/// Write every attribute of `mesh`, transformed by `matrix` and tinted by
/// `tint`, plus its indices, into `reservation`.
///
/// The reservation must be sized for exactly this mesh.
pub fn assemble(
    writers: &[AttributeWriter],
    mesh: &Mesh,
    matrix: &Mat4,
    tint: Vec4,
    reservation: Reservation<'_>,
) -> RenderResult<()> {
    let data = mesh.data();
    let vertex_count = data.positions.len();
    debug_assert_eq!(reservation.vertex_count, vertex_count);

    let identity = *matrix == Mat4::IDENTITY;
    let Reservation {
        base_vertex,
        mut streams,
        strides,
        indices,
        ..
    } = reservation;

    for writer in writers {
        match *writer {
            AttributeWriter::Position2 { stream, offset } => {
                let positions = data.positions.iter();
                let out = &mut *streams[stream];
                if identity {
                    write_each(out, strides[stream], offset, positions.map(|p| p.truncate()));
                } else {
                    write_each(
                        out,
                        strides[stream],
                        offset,
                        positions.map(|p| matrix.transform_point3(*p).truncate()),
                    );
                }
            }
            AttributeWriter::Position3 { stream, offset } => {
                let positions = data.positions.iter();
                let out = &mut *streams[stream];
                if identity {
                    write_each(out, strides[stream], offset, positions.copied());
                } else {
                    write_each(
                        out,
                        strides[stream],
                        offset,
                        positions.map(|p| matrix.transform_point3(*p)),
                    );
                }
            }
            AttributeWriter::Normal3 { stream, offset } => {
                let normals = data.normals.as_ref().ok_or(RenderError::MissingChannel {
                    mesh: mesh.id(),
                    channel: "normal",
                })?;
                let out = &mut *streams[stream];
                if identity {
                    write_each(out, strides[stream], offset, normals.iter().copied());
                } else {
                    let normal_matrix = normal_matrix(matrix);
                    write_each(
                        out,
                        strides[stream],
                        offset,
                        normals.iter().map(|n| (normal_matrix * *n).normalize_or_zero()),
                    );
                }
            }
            AttributeWriter::Color {
                channels,
                stream,
                offset,
            } => {
                let colors = data.colors.as_ref().ok_or(RenderError::MissingChannel {
                    mesh: mesh.id(),
                    channel: "color",
                })?;
                if channels > colors.channels() {
                    return Err(RenderError::ColorChannels {
                        mesh: mesh.id(),
                        available: colors.channels(),
                        requested: channels,
                    });
                }
                write_colors(&mut *streams[stream], strides[stream], offset, colors, channels, tint);
            }
            AttributeWriter::TexCoord2 { stream, offset } => {
                let uvs = data.tex_coords.as_ref().ok_or(RenderError::MissingChannel {
                    mesh: mesh.id(),
                    channel: "texcoord",
                })?;
                write_each(&mut *streams[stream], strides[stream], offset, uvs.iter().copied());
            }
        }
    }

    for (dst, &src) in indices.iter_mut().zip(&data.indices) {
        if src as usize >= vertex_count {
            return Err(RenderError::MalformedMesh {
                mesh: mesh.id(),
                reason: format!("index {src} out of range for {vertex_count} vertices"),
            });
        }
        *dst = src + base_vertex;
    }

    Ok(())
}

fn normal_matrix(matrix: &Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(*matrix);
    if linear.determinant().abs() > f32::EPSILON {
        linear.inverse().transpose()
    } else {
        linear
    }
}

fn write_colors(
    out: &mut [u8],
    stride: usize,
    offset: usize,
    colors: &Colors,
    channels: usize,
    tint: Vec4,
) {
    let tinted = (0..colors.len()).map(|i| colors.rgba(i) * tint);
    match channels {
        1 => write_each(out, stride, offset, tinted.map(|c| c.x)),
        2 => write_each(out, stride, offset, tinted.map(|c| Vec2::new(c.x, c.y))),
        3 => write_each(out, stride, offset, tinted.map(|c| c.truncate())),
        _ => write_each(out, stride, offset, tinted),
    }
}

#[inline]
fn write_each<T: Pod>(out: &mut [u8], stride: usize, offset: usize, values: impl Iterator<Item = T>) {
    let size = std::mem::size_of::<T>();
    for (vertex, value) in out.chunks_exact_mut(stride).zip(values) {
        vertex[offset..offset + size].copy_from_slice(bytemuck::bytes_of(&value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MaterialId;
    use crate::batch::VertexBuffer;
    use crate::resources::{MeshData, VertexAttribute, VertexBufferLayout};
    use glam::Vec3;
    use rstest::rstest;

    fn assemble_into(layout: &VertexLayout, mesh: &Mesh, matrix: Mat4, tint: Vec4) -> VertexBuffer {
        let writers = resolve_layout(layout).unwrap();
        let mut buffer = VertexBuffer::new(layout, 64, 64);
        let reservation = buffer
            .reserve(MaterialId(0), mesh.vertex_count(), mesh.index_count())
            .unwrap();
        assemble(&writers, mesh, &matrix, tint, reservation).unwrap();
        buffer
    }

    #[test]
    fn test_resolve_rejects_unsupported() {
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(28))
            .with_attribute(VertexAttribute::position(0))
            .with_attribute(VertexAttribute::new(
                AttributeSemantic::Tangent,
                AttributeFormat::Float4,
                12,
                0,
            ));
        assert!(matches!(
            resolve_layout(&layout),
            Err(RenderError::UnsupportedAttribute {
                slot: 1,
                semantic: AttributeSemantic::Tangent,
                ..
            })
        ));

        let integer_color = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(16))
            .with_attribute(VertexAttribute::color_channels(5, 0));
        assert!(resolve_layout(&integer_color).is_err());
    }

    #[test]
    fn test_resolve_lit_layout() {
        let writers = resolve_layout(&VertexLayout::lit()).unwrap();
        assert_eq!(
            writers,
            vec![
                AttributeWriter::Position3 { stream: 0, offset: 0 },
                AttributeWriter::Normal3 { stream: 0, offset: 12 },
                AttributeWriter::Color {
                    channels: 4,
                    stream: 0,
                    offset: 24
                },
                AttributeWriter::TexCoord2 { stream: 0, offset: 40 },
            ]
        );
    }

    #[test]
    fn test_identity_positions_are_bit_exact() {
        let odd = [0.1f32 + 1e-7, 1.0 / 3.0, 16_777_217.0, -0.0];
        let mesh = Mesh::new(
            "odd",
            MeshData {
                positions: vec![
                    Vec3::new(odd[0], odd[1], odd[2]),
                    Vec3::new(odd[3], odd[0], odd[1]),
                    Vec3::new(odd[2], odd[3], odd[0]),
                ],
                indices: vec![0, 1, 2],
                ..Default::default()
            },
        );
        let layout = VertexLayout::position_only();
        let buffer = assemble_into(&layout, &mesh, Mat4::IDENTITY, Vec4::ONE);

        let written: Vec<[u32; 3]> = buffer.read_attribute(&layout.attributes[0]);
        let expected: Vec<[u32; 3]> = mesh
            .data()
            .positions
            .iter()
            .map(|p| [p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
            .collect();
        assert_eq!(written, expected);
    }

    #[test]
    fn test_transform_positions_and_normals() {
        let mesh = Mesh::quad();
        let layout = VertexLayout::lit();
        let matrix = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0))
            * Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0));
        let buffer = assemble_into(&layout, &mesh, matrix, Vec4::ONE);

        let positions: Vec<Vec3> = buffer.read_attribute(&layout.attributes[0]);
        assert_eq!(positions[0], Vec3::new(9.0, -0.5, 0.0));
        assert_eq!(positions[2], Vec3::new(11.0, 0.5, 0.0));

        let normals: Vec<Vec3> = buffer.read_attribute(&layout.attributes[1]);
        assert!(normals.iter().all(|n| (*n - Vec3::Z).length() < 1e-6));
    }

    #[rstest]
    #[case::non_uniform_scale(
        Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)),
        Vec3::new(0.5, 1.0, 0.0).normalize()
    )]
    #[case::singular_falls_back_to_linear(
        Mat4::from_scale(Vec3::new(0.0, 1.0, 1.0)),
        Vec3::Y
    )]
    fn test_normals_use_inverse_transpose(#[case] matrix: Mat4, #[case] expected: Vec3) {
        let mut mesh = Mesh::quad();
        mesh.edit().normals = Some(vec![Vec3::new(1.0, 1.0, 0.0).normalize(); 4]);
        let layout = VertexLayout::lit();
        let buffer = assemble_into(&layout, &mesh, matrix, Vec4::ONE);

        let normals: Vec<Vec3> = buffer.read_attribute(&layout.attributes[1]);
        assert_eq!(normals.len(), 4);
        for normal in normals {
            assert!((normal - expected).length() < 1e-6, "{normal:?} != {expected:?}");
        }
    }

    #[rstest]
    #[case(1, vec![0.5])]
    #[case(2, vec![0.5, 0.25])]
    #[case(3, vec![0.5, 0.25, 1.0])]
    #[case(4, vec![0.5, 0.25, 1.0, 0.75])]
    fn test_colors_tinted_and_narrowed(#[case] channels: usize, #[case] expected: Vec<f32>) {
        let mesh = Mesh::quad();
        let stride = 12 + 4 * channels;
        let layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(stride as u32))
            .with_attribute(VertexAttribute::position(0))
            .with_attribute(VertexAttribute::color_channels(channels, 12));
        let buffer = assemble_into(&layout, &mesh, Mat4::IDENTITY, Vec4::new(0.5, 0.25, 1.0, 0.75));

        assert_eq!(buffer.stream(0).len(), 4 * stride);
        for vertex in buffer.stream(0).chunks_exact(stride) {
            let color: Vec<f32> = vertex[12..]
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned)
                .collect();
            assert_eq!(color, expected);
        }
    }

    #[test]
    fn test_texcoords_untransformed() {
        let mesh = Mesh::quad();
        let layout = VertexLayout::sprite();
        let buffer = assemble_into(&layout, &mesh, Mat4::from_scale(Vec3::splat(3.0)), Vec4::ONE);

        let uvs: Vec<Vec2> = buffer.read_attribute(&layout.attributes[2]);
        assert_eq!(&uvs, mesh.data().tex_coords.as_ref().unwrap());
        let positions: Vec<Vec2> = buffer.read_attribute(&layout.attributes[0]);
        assert_eq!(positions[0], Vec2::new(-1.5, -1.5));
    }

    #[test]
    fn test_indices_offset_by_base_vertex() {
        let mesh = Mesh::quad();
        let layout = VertexLayout::position_only();
        let writers = resolve_layout(&layout).unwrap();
        let mut buffer = VertexBuffer::new(&layout, 16, 16);
        for _ in 0..2 {
            let reservation = buffer.reserve(MaterialId(0), 4, 6).unwrap();
            assemble(&writers, &mesh, &Mat4::IDENTITY, Vec4::ONE, reservation).unwrap();
        }
        assert_eq!(buffer.indices(), &[0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]);
    }

    #[test]
    fn test_missing_and_short_channels() {
        let mesh = Mesh::new(
            "bare",
            MeshData {
                positions: vec![Vec3::ZERO; 3],
                colors: Some(Colors::Rgb(vec![Vec3::ONE; 3])),
                indices: vec![0, 1, 2],
                ..Default::default()
            },
        );

        let writers = resolve_layout(&VertexLayout::lit()).unwrap();
        let mut buffer = VertexBuffer::new(&VertexLayout::lit(), 8, 8);
        let reservation = buffer.reserve(MaterialId(0), 3, 3).unwrap();
        assert!(matches!(
            assemble(&writers, &mesh, &Mat4::IDENTITY, Vec4::ONE, reservation),
            Err(RenderError::MissingChannel { channel: "normal", .. })
        ));

        let rgba_layout = VertexLayout::new()
            .with_buffer(VertexBufferLayout::new(16))
            .with_attribute(VertexAttribute::color(0));
        let writers = resolve_layout(&rgba_layout).unwrap();
        let mut buffer = VertexBuffer::new(&rgba_layout, 8, 8);
        let reservation = buffer.reserve(MaterialId(0), 3, 3).unwrap();
        assert!(matches!(
            assemble(&writers, &mesh, &Mat4::IDENTITY, Vec4::ONE, reservation),
            Err(RenderError::ColorChannels {
                available: 3,
                requested: 4,
                ..
            })
        ));
    }

    #[test]
    fn test_check_mesh() {
        assert!(check_mesh(&Mesh::cube()).is_ok());

        let mut mesh = Mesh::quad();
        mesh.edit().indices.push(0);
        assert!(matches!(check_mesh(&mesh), Err(RenderError::MalformedMesh { .. })));

        let mut mesh = Mesh::quad();
        mesh.edit().tex_coords = Some(vec![Vec2::ZERO]);
        assert!(check_mesh(&mesh).is_err());
    }

    #[test]
    fn test_out_of_range_index() {
        let mut mesh = Mesh::quad();
        mesh.edit().indices[5] = 9;
        let layout = VertexLayout::position_only();
        let writers = resolve_layout(&layout).unwrap();
        let mut buffer = VertexBuffer::new(&layout, 8, 8);
        let reservation = buffer.reserve(MaterialId(0), 4, 6).unwrap();
        assert!(matches!(
            assemble(&writers, &mesh, &Mat4::IDENTITY, Vec4::ONE, reservation),
            Err(RenderError::MalformedMesh { .. })
        ));
    }
}
