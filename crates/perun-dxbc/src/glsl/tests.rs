use indoc::indoc;
use pretty_assertions::assert_eq;

use super::*;
use crate::rdef::ResourceDimension;
use crate::test_utils::{
    build_container, mov, operand_token, ElementSpec, ProgramBuilder, RdefBuilder,
    SignatureBuilder, VariableSpec,
};

fn globals() -> Vec<u8> {
    RdefBuilder::new(ProgramType::Pixel, 5, 0)
        .constant_buffer("Globals", 16, vec![VariableSpec::float4("tint", 0)])
        .build()
}

fn transpile(chunks: &[(&[u8; 4], &[u8])]) -> String {
    transpile_with(chunks, &GlslOptions::default())
}

fn transpile_with(chunks: &[(&[u8; 4], &[u8])], options: &GlslOptions) -> String {
    let bytes = build_container(chunks);
    let container = DxbcContainer::parse(&bytes).unwrap();
    container.to_glsl_with(options).unwrap()
}

fn body(glsl: &str) -> Vec<&str> {
    glsl.lines()
        .skip_while(|line| *line != "void main() {")
        .skip(1)
        .map(str::trim)
        .filter(|line| !line.is_empty() && *line != "}")
        .collect()
}

#[test]
fn test_minimal_pixel_shader() {
    let rdef = globals();
    let shex = ProgramBuilder::new(ProgramType::Pixel, 5, 0)
        .instruction(
            OpcodeType::Mov,
            0,
            &mov((OperandType::Output, 0), (OperandType::Temp, 0)),
        )
        .instruction(OpcodeType::Ret, 0, &[])
        .build();

    let glsl = transpile(&[(b"RDEF", &rdef), (b"SHEX", &shex)]);
    assert_eq!(
        glsl,
        indoc! {"
            #version 450
            // ps_5_0

            layout(std140) uniform Globals {
                vec4 tint; // offset 0
            };

            layout(location = 0) out vec4 o0;

            void main() {
                vec4 r0;
                o0.xyzw = r0.xyzw;
                return;
            }
        "}
    );
}

#[test]
fn test_block_binding_by_name() {
    let rdef = globals();
    let options = GlslOptions {
        bindings: BlockBindings::new(["PerFrame", "Globals", "Globals"]),
        version: 330,
    };
    let glsl = transpile_with(&[(b"RDEF", &rdef)], &options);

    assert!(glsl.starts_with("#version 330\n"));
    assert!(glsl.contains("layout(std140, binding = 1) uniform Globals {"));
    assert_eq!(options.bindings.len(), 2);
    assert_eq!(options.bindings.get("PerFrame"), Some(0));
    assert_eq!(options.bindings.get("Missing"), None);
}

#[test]
fn test_signatures_and_system_values() {
    let isgn = SignatureBuilder::new(false)
        .element(ElementSpec::new("SV_Position", 0, 0xF).system_value(1))
        .element(ElementSpec::new("TEXCOORD", 0, 0x3).register(1))
        .element(ElementSpec::new("BLENDINDICES", 0, 0x1).register(2).component_type(1))
        .build();
    let osgn = SignatureBuilder::new(false)
        .element(ElementSpec::new("SV_Target", 0, 0xF).system_value(64))
        .element(ElementSpec::new("SV_Target", 1, 0xF).register(1))
        .build();
    let shex = ProgramBuilder::new(ProgramType::Pixel, 4, 0)
        .instruction(
            OpcodeType::DclInputPs,
            3 << 11,
            &[operand_token::mask(OperandType::Input, 0x3, 1), 1],
        )
        .instruction(OpcodeType::Ret, 0, &[])
        .build();

    let glsl = transpile(&[(b"ISGN", &isgn), (b"OSGN", &osgn), (b"SHDR", &shex)]);

    assert!(glsl.contains("vec4 v0; // SV_Position\n"));
    assert!(glsl.contains("layout(location = 1) centroid in vec4 v1; // TEXCOORD\n"));
    assert!(glsl.contains("layout(location = 2) flat in uvec4 v2; // BLENDINDICES\n"));
    assert!(glsl.contains("layout(location = 0) out vec4 o0; // SV_Target\n"));
    assert!(glsl.contains("layout(location = 1) out vec4 o1; // SV_Target1\n"));
    assert_eq!(body(&glsl)[0], "v0 = gl_FragCoord;");
}

#[test]
fn test_vertex_position_epilogue() {
    let osgn = SignatureBuilder::new(false)
        .element(ElementSpec::new("SV_Position", 0, 0xF).system_value(1))
        .build();
    let shex = ProgramBuilder::new(ProgramType::Vertex, 4, 0)
        .instruction(
            OpcodeType::Mov,
            0,
            &mov((OperandType::Output, 0), (OperandType::Input, 0)),
        )
        .instruction(OpcodeType::Ret, 0, &[])
        .build();

    let glsl = transpile(&[(b"OSGN", &osgn), (b"SHDR", &shex)]);
    assert!(glsl.contains("vec4 o0; // SV_Position\n"));
    assert_eq!(
        body(&glsl),
        vec!["o0.xyzw = v0.xyzw;", "gl_Position = o0;", "return;"]
    );
}

#[test]
fn test_dot_product_forces_source_lanes() {
    let rdef = globals();
    let shex = ProgramBuilder::new(ProgramType::Pixel, 5, 0)
        .instruction(OpcodeType::DclTemps, 0, &[2])
        // dp3 r1.x, r0.xyzx, cb0[0].xyzx
        .instruction(
            OpcodeType::Dp3,
            0,
            &[
                operand_token::mask(OperandType::Temp, 0x1, 1),
                1,
                operand_token::swizzle(OperandType::Temp, [0, 1, 2, 0], 1),
                0,
                operand_token::swizzle(OperandType::ConstantBuffer, [0, 1, 2, 0], 2),
                0,
                0,
            ],
        )
        // dp4 r1.yz, r0.xyzw, r0.xyzw
        .instruction(
            OpcodeType::Dp4,
            0,
            &[
                operand_token::mask(OperandType::Temp, 0x6, 1),
                1,
                operand_token::swizzle(OperandType::Temp, [0, 1, 2, 3], 1),
                0,
                operand_token::swizzle(OperandType::Temp, [0, 1, 2, 3], 1),
                0,
            ],
        )
        .build();

    let glsl = transpile(&[(b"RDEF", &rdef), (b"SHEX", &shex)]);
    assert_eq!(
        body(&glsl),
        vec![
            "// dcl_temps 2",
            "vec4 r0;",
            "vec4 r1;",
            "r1.x = dot(r0.xyz, tint.xyz);",
            "r1.yz = vec2(dot(r0.xyzw, r0.xyzw));",
        ]
    );
}

#[test]
fn test_saturate_wraps_once() {
    let shex = ProgramBuilder::new(ProgramType::Pixel, 4, 0)
        .instruction(
            OpcodeType::Mov,
            1 << 13,
            &mov((OperandType::Output, 0), (OperandType::Temp, 0)),
        )
        .build();

    let glsl = transpile(&[(b"SHDR", &shex)]);
    assert!(glsl.contains("o0.xyzw = clamp(r0.xyzw, 0.0, 1.0);"));
    assert_eq!(glsl.matches("clamp(").count(), 1);
}

#[test]
fn test_integer_ops_bitcast() {
    let shex = ProgramBuilder::new(ProgramType::Pixel, 4, 0)
        // iadd r0.x, r0.x, l(1)
        .instruction(
            OpcodeType::Iadd,
            0,
            &[
                operand_token::mask(OperandType::Temp, 0x1, 1),
                0,
                operand_token::select1(OperandType::Temp, 0, 1),
                0,
                operand_token::immediate32(1),
                1,
            ],
        )
        // udiv r1.x, null, r2.x, r3.x
        .instruction(
            OpcodeType::Udiv,
            0,
            &[
                operand_token::mask(OperandType::Temp, 0x1, 1),
                1,
                operand_token::zero(OperandType::Null),
                operand_token::select1(OperandType::Temp, 0, 1),
                2,
                operand_token::select1(OperandType::Temp, 0, 1),
                3,
            ],
        )
        // lt r0.y, r0.x, l(0.5)
        .instruction(
            OpcodeType::Lt,
            0,
            &[
                operand_token::mask(OperandType::Temp, 0x2, 1),
                0,
                operand_token::select1(OperandType::Temp, 0, 1),
                0,
                operand_token::immediate32(1),
                0.5f32.to_bits(),
            ],
        )
        .build();

    let glsl = transpile(&[(b"SHDR", &shex)]);
    assert_eq!(
        body(&glsl),
        vec![
            "vec4 r0;",
            "vec4 r1;",
            "vec4 r2;",
            "vec4 r3;",
            "r0.x = intBitsToFloat(floatBitsToInt(r0.x) + 1);",
            "r1.x = uintBitsToFloat(floatBitsToUint(r2.x) / floatBitsToUint(r3.x));",
            "r0.y = uintBitsToFloat(r0.x < 0.5 ? 0xffffffffu : 0u);",
        ]
    );
}

#[test]
fn test_texture_sample() {
    let rdef = RdefBuilder::new(ProgramType::Pixel, 4, 0)
        .texture("diffuse", 0, ResourceDimension::Texture2D)
        .build();
    let shex = ProgramBuilder::new(ProgramType::Pixel, 4, 0)
        .instruction(
            OpcodeType::Sample,
            0,
            &[
                operand_token::mask(OperandType::Temp, 0xF, 1),
                0,
                operand_token::swizzle(OperandType::Input, [0, 1, 0, 0], 1),
                1,
                operand_token::swizzle(OperandType::Resource, [0, 1, 2, 3], 1),
                0,
                operand_token::zero(OperandType::Sampler) | (1 << 20),
                0,
            ],
        )
        .build();

    let glsl = transpile(&[(b"RDEF", &rdef), (b"SHDR", &shex)]);
    assert!(glsl.contains("uniform sampler2D diffuse;\n"));
    assert!(glsl.contains("layout(location = 1) in vec4 v1;\n"));
    assert!(glsl.contains("r0.xyzw = texture(diffuse, v1.xy).xyzw;"));
}

#[test]
fn test_unimplemented_opcode_keeps_going() {
    let shex = ProgramBuilder::new(ProgramType::Pixel, 4, 0)
        .instruction(OpcodeType::Emit, 0, &[])
        .instruction(
            OpcodeType::Mov,
            0,
            &mov((OperandType::Output, 0), (OperandType::Temp, 0)),
        )
        .build();

    let glsl = transpile(&[(b"SHDR", &shex)]);
    assert_eq!(
        body(&glsl),
        vec!["vec4 r0;", "// unimplemented: emit", "o0.xyzw = r0.xyzw;"]
    );
}

#[test]
fn test_immediate_constant_buffer() {
    let mut icb = vec![OpcodeType::CustomData as u32 | (3 << 11), 2 + 8];
    icb.extend([1.0f32, 0.0, 0.0, 1.0, 0.5, 0.25, 0.0, -2.0].map(f32::to_bits));
    let mut shex = ProgramBuilder::new(ProgramType::Pixel, 4, 0).build();
    shex.extend(icb.iter().flat_map(|t| t.to_le_bytes()));
    let length = (shex.len() / 4) as u32;
    shex[4..8].copy_from_slice(&length.to_le_bytes());

    let glsl = transpile(&[(b"SHDR", &shex)]);
    assert!(glsl.contains(
        "const vec4 icb[2] = vec4[2](vec4(1.0, 0.0, 0.0, 1.0), vec4(0.5, 0.25, 0.0, -2.0));"
    ));
}

#[test]
fn test_unresolved_lane_reads_declared_array() {
    // Row 1 lies inside the buffer but past its only variable.
    let rdef = RdefBuilder::new(ProgramType::Pixel, 5, 0)
        .constant_buffer("Globals", 32, vec![VariableSpec::float4("tint", 0)])
        .build();
    let shex = ProgramBuilder::new(ProgramType::Pixel, 5, 0)
        .instruction(
            OpcodeType::Mov,
            0,
            &[
                operand_token::mask(OperandType::Output, 0xF, 1),
                0,
                operand_token::swizzle(OperandType::ConstantBuffer, [0, 1, 2, 3], 2),
                0,
                1,
            ],
        )
        .build();

    let options = GlslOptions {
        bindings: BlockBindings::new(["Globals"]),
        ..GlslOptions::default()
    };
    let glsl = transpile_with(&[(b"RDEF", &rdef), (b"SHEX", &shex)], &options);

    assert!(glsl.contains("layout(std140, binding = 0) uniform Globals {\n"));
    assert!(glsl.contains(indoc! {"
        layout(std140, binding = 0) uniform cb0_block {
            vec4 cb0[2];
        };
    "}));
    assert_eq!(body(&glsl), vec!["o0.xyzw = cb0[1].xyzw;"]);
}
