use std::sync::Arc;

use scribble::{
	compile_many,
	core::shader::StageSlot,
	libs::{
		cache::ShaderCache,
		handle::Handle,
		reload::{HotShader, Reload},
		source::{Embedded, MemorySources},
	},
	Compiler,
	Error,
};
use typed_path::{Utf8UnixPath, Utf8UnixPathBuf};

const SHADER: &str = r#"Shader {
	GLSL VS {
#include "common.glsl"
		void main() {}
	}
	GLSL FS { void main() {} }
	Technique Main { Pass { Vertex = VS Fragment = FS } }
}
"#;

fn sources() -> Arc<MemorySources> {
	let sources = Arc::new(MemorySources::new());
	sources.insert("/shader.glsl", SHADER);
	sources.insert("/common.glsl", "float common_value;\n");
	sources.insert("/other.glsl", "float other_value;\n");
	sources
}

fn vertex_source(compilation: &scribble::Compilation) -> &str {
	&compilation.stages.get("Main", 0, StageSlot::Vertex).unwrap().source
}

#[test]
fn cache_reuses_until_a_dependency_changes() {
	let sources = sources();
	let compiler = Compiler::new(sources.clone());
	let cache = ShaderCache::new();
	let root = Utf8UnixPath::new("/shader.glsl");

	let first = cache.get_or_compile(&compiler, root).unwrap();
	let second = cache.get_or_compile(&compiler, root).unwrap();
	assert!(Arc::ptr_eq(&first, &second));

	sources.insert("/other.glsl", "float changed;\n");
	assert!(Arc::ptr_eq(&first, &cache.get_or_compile(&compiler, root).unwrap()));

	sources.insert("/common.glsl", "float changed;\n");
	let third = cache.get_or_compile(&compiler, root).unwrap();
	assert!(!Arc::ptr_eq(&first, &third));
	assert!(vertex_source(&third).contains("float changed;"));

	assert_eq!(cache.invalidate(Utf8UnixPath::new("/other.glsl")), 0);
	assert_eq!(cache.invalidate(Utf8UnixPath::new("/common.glsl")), 1);
	assert!(cache.is_empty());
}

#[test]
fn hot_reload_swaps_only_on_success() {
	let sources = sources();
	let compiler = Compiler::new(sources.clone());
	let shader = HotShader::load(&compiler, Utf8UnixPath::new("/shader.glsl")).unwrap();
	let original = shader.current();

	assert!(matches!(
		shader.on_change(&compiler, [Utf8UnixPath::new("/other.glsl")]),
		Reload::Unaffected
	));

	sources.insert("/shader.glsl", "Shader {");
	match shader.on_change(&compiler, [Utf8UnixPath::new("/shader.glsl")]) {
		Reload::Failed(Error::Syntax { .. }) => {}
		other => panic!("{:?}", other),
	}
	assert!(shader.current().same(&original));

	sources.insert("/shader.glsl", SHADER);
	sources.insert("/common.glsl", "float reloaded;\n");
	let reloaded = match shader.on_change(&compiler, [Utf8UnixPath::new("/common.glsl")]) {
		Reload::Reloaded(handle) => handle,
		other => panic!("{:?}", other),
	};
	assert!(shader.current().same(&reloaded));
	assert!(vertex_source(&shader.current()).contains("float reloaded;"));

	let stale = compiler.compile(shader.root()).unwrap();
	assert!(matches!(shader.swap(&original, Handle::new(stale)), Reload::Superseded));
	assert!(shader.current().same(&reloaded));
}

#[test]
fn many_roots_compile_in_order() {
	let sources = sources();
	sources.insert("/broken.glsl", "Shader { GLSL A {} Technique T { Pass { Vertex = A Fragment = B } } }");
	let compiler = Compiler::new(sources);

	let roots: Vec<_> = ["/shader.glsl", "/broken.glsl", "/shader.glsl"]
		.into_iter()
		.map(Utf8UnixPathBuf::from)
		.collect();
	let results = compile_many(&compiler, &roots);

	assert_eq!(results.len(), 3);
	assert!(results[0].is_ok());
	assert!(matches!(&results[1], Err(Error::UnresolvedBlockReference { name, .. }) if name == "B"));
	assert_eq!(results[0].as_ref().unwrap(), results[2].as_ref().unwrap());
}

#[derive(rust_embed::Embed)]
#[folder = "tests/fixtures/"]
#[prefix = "/"]
struct Fixtures;

#[test]
fn embedded_sources() {
	let compiler = Compiler::new(Embedded(Fixtures));
	let compilation = compiler.compile(Utf8UnixPath::new("/scribble/lit.glsl")).unwrap();

	assert_eq!(compilation.stages.len(), 2);
	assert!(compilation.dependencies.dependencies().contains(&Utf8UnixPathBuf::from("/glsl/lighting.glsl")));
}
