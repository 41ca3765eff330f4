#[test]
fn readme_deps_are_up_to_date() {
    version_sync::assert_markdown_deps_updated!("README.md");
}
