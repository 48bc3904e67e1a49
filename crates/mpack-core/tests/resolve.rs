//! End-to-end resolver scenarios over real on-disk fixtures.

use mpack_core::{module_parts, AliasValue, DistPathMapper, InitOptions, PackageReader, Resolver};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn touch(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn resolver_for(options: InitOptions) -> Resolver {
    Resolver::new(Arc::new(options), Arc::new(PackageReader::new()))
}

#[test]
fn alias_to_local_path() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("src/app.ts"), "");
    touch(&root.join("src/utils/index.ts"), "");

    let options = InitOptions::new(root.join("src"), root.join("dist"))
        .with_root_dir(root)
        .with_extensions([".ts", ".js"])
        .with_alias("@/utils", AliasValue::Path("./src/utils".to_string()));

    let resolver = resolver_for(options.clone());
    let res = resolver
        .resolve("@/utils/index", Some(&root.join("src/app.ts")))
        .unwrap();
    assert_eq!(res.real_path, root.join("src/utils/index.ts"));

    // The matching dist path mirrors the source tree, with the rendition
    // extension replacing the source one.
    let dist = DistPathMapper::new(Arc::new(options));
    assert_eq!(
        dist.generate(&res.real_path, Some(".js")),
        root.join("dist/utils/index.js")
    );
}

#[test]
fn record_alias_with_dist_prefix() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("src/comp.js"), "");
    touch(
        &root.join("node_modules/miniprogram-navigation-bar/index.js"),
        "",
    );

    let options = InitOptions::new(root.join("src"), root.join("dist"))
        .with_root_dir(root)
        .with_alias(
            "@navbar",
            AliasValue::Record {
                path: "./node_modules/miniprogram-navigation-bar".to_string(),
                dist: Some("pages/aliasComponent/".to_string()),
            },
        );

    let resolver = resolver_for(options.clone());
    let res = resolver
        .resolve("@navbar/index", Some(&root.join("src/comp.js")))
        .unwrap();
    assert_eq!(
        res.real_path,
        root.join("node_modules/miniprogram-navigation-bar/index.js")
    );

    let dist = DistPathMapper::new(Arc::new(options));
    assert_eq!(
        dist.generate(&res.real_path, Some(".js")),
        root.join("dist/pages/aliasComponent/@navbar/index.js")
    );
}

#[test]
fn node_modules_walk_with_main_field() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("a/b/c/x.ts"), "");
    touch(
        &root.join("a/node_modules/lodash/package.json"),
        r#"{"name": "lodash", "main": "index.js"}"#,
    );
    touch(&root.join("a/node_modules/lodash/index.js"), "");

    let options = InitOptions::new(root.join("a"), root.join("dist"))
        .with_root_dir(root)
        .with_extensions([".ts", ".js"]);

    let resolver = resolver_for(options.clone());
    let res = resolver
        .resolve("lodash", Some(&root.join("a/b/c/x.ts")))
        .unwrap();
    assert_eq!(res.real_path, root.join("a/node_modules/lodash/index.js"));

    let dist = DistPathMapper::new(Arc::new(options));
    assert_eq!(
        dist.generate(&res.real_path, None),
        root.join("dist/npm/lodash/index.js")
    );
}

#[test]
fn scoped_module_subpath() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("src/x.ts"), "");
    touch(&root.join("node_modules/@scope/pkg/deep/file.ts"), "");

    assert_eq!(
        module_parts("@scope/pkg/deep/file"),
        vec!["@scope/pkg", "deep", "file"]
    );

    let options = InitOptions::new(root.join("src"), root.join("dist"))
        .with_root_dir(root)
        .with_extensions([".ts", ".js"]);
    let resolver = resolver_for(options);
    let res = resolver
        .resolve("@scope/pkg/deep/file", Some(&root.join("src/x.ts")))
        .unwrap();
    assert_eq!(
        res.real_path,
        root.join("node_modules/@scope/pkg/deep/file.ts")
    );
}

#[test]
fn source_rooted_absolute() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("src/pages/deep/a.ts"), "");
    touch(&root.join("src/assets/logo.png"), "");

    let options = InitOptions::new(root.join("src"), root.join("dist"))
        .with_root_dir(root)
        .with_extensions([".ts", ".js"]);
    let resolver = resolver_for(options);

    // Resolves against the source dir regardless of the requesting file.
    let res = resolver
        .resolve("/assets/logo.png", Some(&root.join("src/pages/deep/a.ts")))
        .unwrap();
    assert_eq!(res.real_path, root.join("src/assets/logo.png"));
}

#[test]
fn shared_and_private_resolvers_agree() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("src/a.ts"), "");
    touch(&root.join("src/b.ts"), "");
    touch(&root.join("src/util/index.ts"), "");

    let options = Arc::new(
        InitOptions::new(root.join("src"), root.join("dist"))
            .with_root_dir(root)
            .with_extensions([".ts", ".js"]),
    );

    // One resolver shared across requesting files, as the worker pool
    // publishes it.
    let shared = Arc::new(Resolver::new(
        Arc::clone(&options),
        Arc::new(PackageReader::new()),
    ));
    let from_a = shared
        .resolve("./util", Some(&root.join("src/a.ts")))
        .unwrap();
    let from_b = shared
        .resolve("./util", Some(&root.join("src/b.ts")))
        .unwrap();

    // A private resolver with identical configuration.
    let private = Resolver::new(options, Arc::new(PackageReader::new()));
    let private_res = private
        .resolve("./util", Some(&root.join("src/a.ts")))
        .unwrap();

    assert_eq!(from_a.real_path, root.join("src/util/index.ts"));
    assert_eq!(from_a.real_path, from_b.real_path);
    assert_eq!(from_a.real_path, private_res.real_path);
}

#[cfg(unix)]
#[test]
fn fifo_resolves_as_file() {
    use std::process::Command;

    let dir = tempdir().unwrap();
    let root = dir.path();
    touch(&root.join("src/a.ts"), "");
    fs::create_dir_all(root.join("src")).unwrap();
    let fifo = root.join("src/stream.ts");
    let status = Command::new("mkfifo").arg(&fifo).status().unwrap();
    assert!(status.success());

    let options = InitOptions::new(root.join("src"), root.join("dist"))
        .with_root_dir(root)
        .with_extensions([".ts", ".js"]);
    let resolver = resolver_for(options);
    let res = resolver
        .resolve("./stream", Some(&root.join("src/a.ts")))
        .unwrap();
    assert_eq!(res.real_path, fifo);
}
