use scribble::{
	core::shader::{PropertyType, StageSlot, Value},
	Compiler,
	Directory,
	Error,
};
use typed_path::Utf8UnixPath;

fn compiler() -> Compiler {
	Compiler::new(Directory::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures")))
}

#[test]
fn structure_fixture() {
	let (shader, _) = compiler().parse(Utf8UnixPath::new("/scribble/structure.glsl")).unwrap();

	assert_eq!(shader.techniques.len(), 1);
	let technique = shader.technique("Main").unwrap();
	assert_eq!(technique.passes.len(), 1);

	let pass = &technique.passes[0];
	assert_eq!(pass.stages.len(), 5);

	let names = |slot| pass.stage(slot).unwrap().block_names();
	assert_eq!(names(StageSlot::Vertex), vec!["Common", "MockVS"]);
	assert_eq!(names(StageSlot::Fragment), vec!["Common", "MockFS"]);
	assert_eq!(names(StageSlot::TessellationControl), vec!["MockTC"]);
	assert_eq!(names(StageSlot::TessellationEvaluation), vec!["MockTE"]);
	assert_eq!(names(StageSlot::Geometry), vec!["MockGS"]);
}

#[test]
fn property_typing() {
	let (shader, _) = compiler().parse(Utf8UnixPath::new("/scribble/structure.glsl")).unwrap();

	let v3 = shader.property("_v3").unwrap();
	assert_eq!(v3.ty, PropertyType::Vec3);
	assert_eq!(v3.default, Some(Value::Vec3([0.1, 0.2, 0.3])));

	assert_eq!(shader.property("_auto_v4").unwrap().ty, PropertyType::Vec4);
	assert_eq!(shader.property("_color").unwrap().ty, PropertyType::Color);
	assert_eq!(shader.property("_color").unwrap().label, "Colour");
}

#[test]
fn parsing_twice_gives_equal_shaders() {
	let compiler = compiler();
	let path = Utf8UnixPath::new("/scribble/structure.glsl");

	assert_eq!(compiler.parse(path).unwrap().0, compiler.parse(path).unwrap().0);
}

#[test]
fn every_bound_stage_is_compiled() {
	let compilation = compiler().compile(Utf8UnixPath::new("/scribble/structure.glsl")).unwrap();

	let keys: Vec<_> = compilation.stages.iter().map(|(key, _)| key.to_string()).collect();
	assert_eq!(keys, vec![
		"Main:0:Vertex",
		"Main:0:TessellationControl",
		"Main:0:TessellationEvaluation",
		"Main:0:Geometry",
		"Main:0:Fragment",
	]);
}

#[test]
fn stage_is_its_blocks_plus_markers() {
	let compilation = compiler().compile(Utf8UnixPath::new("/scribble/structure.glsl")).unwrap();
	let stage = compilation.stages.get("Main", 0, StageSlot::Vertex).unwrap();

	let mut lines = stage.source.lines();
	assert_eq!(lines.next(), Some("#version 330 core"));
	let body: Vec<_> = lines.filter(|line| !line.starts_with("#line ")).collect();

	let shader = &compilation.shader;
	let expected: Vec<_> = ["Common", "MockVS"]
		.into_iter()
		.flat_map(|name| shader.block(name).unwrap().body.lines())
		.collect();

	assert_eq!(body, expected);
	assert_eq!(stage.blocks, vec!["Common", "MockVS"]);
}

#[test]
fn techniques_fixture() {
	let compiler = compiler();
	let path = Utf8UnixPath::new("/scribble/techniques.glsl");

	let (shader, _) = compiler.parse(path).unwrap();
	let names: Vec<_> = shader.techniques.keys().map(String::as_str).collect();
	assert_eq!(names, vec!["Main", "Shadow"]);
	assert_eq!(shader.technique("Main").unwrap().passes.len(), 2);
	assert_eq!(shader.technique("Shadow").unwrap().passes.len(), 1);

	match compiler.compile(path) {
		Err(Error::UnresolvedBlockReference { name, position }) => {
			assert_eq!(name, "GeometryShader");
			assert_eq!(position.path().as_str(), "/scribble/techniques.glsl");
			assert_eq!(position.line, 14);
		}
		other => panic!("{:?}", other),
	}
}

#[test]
fn unreadable_root() {
	assert!(matches!(
		compiler().compile(Utf8UnixPath::new("/scribble/nowhere.glsl")),
		Err(Error::Read { .. })
	));
}
