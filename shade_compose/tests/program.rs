use shade_compose::*;

#[macro_use]
mod common;
use common::{Call, RecordingProgram};

const VERT: &str = "void main() { gl_Position = $position; }";
const FRAG: &str = "void main() { gl_FragColor = vec4($scale); }";

fn program() -> ModularProgram<RecordingProgram> {
    let program = ModularProgram::new(RecordingProgram::default(), VERT, FRAG).unwrap();
    program.vert().set("position", "vec4(0.0, 0.0, 0.0, 1.0)").unwrap();
    program
}

#[test]
fn unchanged_values_are_uploaded_once() {
    let mut program = program();
    let scale = Variable::parse("uniform float u_scale").unwrap();
    scale.set_value(5.0f32).unwrap();
    program.frag().set("scale", &scale).unwrap();

    program.draw(3).unwrap();
    program.draw(3).unwrap();
    assert_eq!(program.gpu().uploads(), [("u_scale".to_string(), ShaderValue::from(5.0f32))]);

    scale.set_value(6.0f32).unwrap();
    assert!(!program.is_dirty());
    program.draw(3).unwrap();
    assert_eq!(program.gpu().uploads(), [
        ("u_scale".to_string(), ShaderValue::from(5.0f32)),
        ("u_scale".to_string(), ShaderValue::from(6.0f32)),
    ]);
    assert_eq!(program.gpu().builds(), 1);
    assert_eq!(program.gpu().calls.last(), Some(&Call::Draw(3)));
}

#[test]
fn values_bound_directly_become_uniforms() {
    let mut program = program();
    program.frag().set("scale", 2.0f32).unwrap();
    program.draw(1).unwrap();
    assert_eq!(program.gpu().uploads(), [("u_scale".to_string(), ShaderValue::from(2.0f32))]);
    assert!(program.gpu().shader("frag").unwrap().contains("uniform float u_scale;"));

    program.frag().set("scale", 4.0f32).unwrap();
    program.draw(1).unwrap();
    assert_eq!(program.gpu().builds(), 1);
    assert_eq!(program.gpu().uploads().last(), Some(&("u_scale".to_string(), ShaderValue::from(4.0f32))));
}

#[test]
fn rebuilds_upload_everything_again() {
    let mut program = program();
    program.frag().set("scale", 2.0f32).unwrap();
    program.draw(1).unwrap();

    program.vert().set("position", "vec4(1.0)").unwrap();
    assert!(program.is_dirty());
    program.draw(1).unwrap();
    assert_eq!(program.gpu().builds(), 2);
    assert_eq!(program.gpu().uploads().len(), 2);
    assert_eq_code!(&program.gpu().shader("vert").unwrap(), "void main() { gl_Position = vec4(1.0); }");
}

#[test]
fn variables_without_values_are_skipped() {
    let mut program = program();
    let scale = Variable::parse("uniform float u_scale").unwrap();
    program.frag().set("scale", &scale).unwrap();
    program.draw(1).unwrap();
    assert!(program.gpu().uploads().is_empty());

    scale.set_value(1.5f32).unwrap();
    program.draw(1).unwrap();
    assert_eq!(program.gpu().uploads(), [("u_scale".to_string(), ShaderValue::from(1.5f32))]);
}

#[test]
fn failed_builds_never_reach_the_gpu() {
    let mut program = program();
    let scale = Variable::new(Some("u_scale"), None, None, None).unwrap();
    program.frag().set("scale", &scale).unwrap();
    match program.draw(1) {
        Err(ProgramError::Compile(Error::MissingType { variable, .. })) => assert_eq!(variable, "u_scale"),
        other => panic!("expected a missing type, got {other:?}"),
    }
    assert!(program.gpu().calls.is_empty());
    assert!(program.is_dirty());

    scale.set_value(2.0f32).unwrap();
    program.draw(1).unwrap();
    assert_eq!(program.gpu().builds(), 1);
    assert!(program.gpu().shader("frag").unwrap().contains("uniform float u_scale;"));
}

#[test]
fn unbound_placeholders_are_reported_as_warnings() {
    let mut program = ModularProgram::new(RecordingProgram::default(), VERT, FRAG).unwrap();
    program.frag().set("scale", "1.0").unwrap();
    program.draw(1).unwrap();
    let warnings = program.compiled().unwrap().warnings();
    assert!(matches!(warnings, [Warning::UnsubstitutedPlaceholders { placeholders, .. }] if placeholders == &["position"]), "{warnings:?}");
    assert!(program.gpu().shader("vert").unwrap().contains("$position"));
}

#[test]
fn gpu_errors_are_passed_through() {
    let mut program = program();
    program.frag().set("scale", 2.0f32).unwrap();
    program.gpu_mut().fail_draw = Some("context lost".to_string());
    let error = program.draw(1).unwrap_err();
    assert!(matches!(&error, ProgramError::Gpu(message) if message == "context lost"));
    assert_eq!(error.to_string(), "gpu program failed: context lost");
}

#[test]
fn varyings_use_in_and_out_on_newer_versions() {
    let mut program = ModularProgram::new(
        RecordingProgram::default(),
        "#version 300 es\nvoid main() { gl_Position = $position; }",
        "#version 300 es\nout vec4 frag_color;\nvoid main() { frag_color = $color; }",
    ).unwrap();
    let position = Variable::parse("attribute vec4 a_position").unwrap();
    let color = Variable::parse("attribute vec4 a_color").unwrap();
    let v_color = Varying::new("v_color");
    program.vert().set("position", &position).unwrap();
    program.vert().set(&v_color, &color).unwrap();
    program.frag().set("color", &v_color).unwrap();
    program.draw(3).unwrap();

    let vert = program.gpu().shader("vert").unwrap();
    let frag = program.gpu().shader("frag").unwrap();
    assert!(vert.starts_with("#version 300 es\n"), "{vert}");
    assert!(vert.contains("in vec4 a_position;"), "{vert}");
    assert!(vert.contains("out vec4 v_color;"), "{vert}");
    assert!(vert.contains("v_color = a_color;"), "{vert}");
    assert!(frag.starts_with("#version 300 es\n"), "{frag}");
    assert!(frag.contains("in vec4 v_color;"), "{frag}");
    assert!(frag.contains("frag_color = v_color;"), "{frag}");
    assert!(!frag.contains("varying"), "{frag}");
}

#[test]
fn varyings_keep_their_qualifier_on_old_versions() {
    let mut program = program();
    let v_scale = Varying::with_dtype("v_scale", "float");
    program.vert().set(&v_scale, "1.0").unwrap();
    program.frag().set("scale", &v_scale).unwrap();
    program.draw(1).unwrap();
    assert!(program.gpu().shader("vert").unwrap().contains("varying float v_scale;"));
    assert!(program.gpu().shader("frag").unwrap().contains("varying float v_scale;"));
    assert!(program.gpu().uploads().is_empty());
}

#[test]
fn hook_callbacks_are_compiled_in() {
    let mut program = ModularProgram::new(
        RecordingProgram::default(),
        VERT,
        "void main() {\n    $before();\n    gl_FragColor = vec4($scale);\n}",
    ).unwrap();
    program.vert().set("position", "vec4(0.0)").unwrap();
    program.frag().set("scale", "1.0").unwrap();
    program.frag().add_chain("before").unwrap();
    program.draw(1).unwrap();
    assert_eq_code!(&program.gpu().shader("frag").unwrap(), "
        void before() {
        }
        void main() {
            before();
            gl_FragColor = vec4(1.0);
        }
    ");

    let discard = Function::new("void discard_dark() { if (gl_FragCoord.x < 1.0) discard; }").unwrap();
    program.frag().add_callback("before", &discard).unwrap();
    assert!(program.is_dirty());
    program.draw(1).unwrap();
    assert_eq!(program.gpu().builds(), 2);
    assert_eq_code!(&program.gpu().shader("frag").unwrap(), "
        void discard_dark() { if (gl_FragCoord.x < 1.0) discard; }
        void before() {
            discard_dark();
        }
        void main() {
            before();
            gl_FragColor = vec4(1.0);
        }
    ");

    program.frag().remove_callback("before", &discard).unwrap();
    program.draw(1).unwrap();
    assert!(!program.gpu().shader("frag").unwrap().contains("discard_dark"));
}

#[test]
fn geometry_stages_are_optional() {
    let mut program = program();
    program.frag().set("scale", "1.0").unwrap();
    program.set_geom(Some("void main() { EmitVertex(); }")).unwrap();
    program.draw(1).unwrap();
    assert!(program.gpu().shader("geom").is_some());
    assert!(program.stage(ShaderStage::Geometry).is_some());

    program.set_geom(None).unwrap();
    program.draw(1).unwrap();
    assert_eq!(program.gpu().builds(), 2);
    assert_eq!(program.gpu().shader("geom"), None);
    assert_eq!(program.compiled().unwrap().get("geom"), None);
}
