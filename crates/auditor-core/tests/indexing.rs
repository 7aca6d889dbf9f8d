extern crate auditor_core;

use auditor_core::model::{InvocationPattern, TokenKind};
use auditor_core::{indexer, store::Store};
use pretty_assertions::assert_eq;

const MAIN_ACTIVITY: &str = r#".class public Lcom/example/MainActivity;
.super Landroid/app/Activity;

# instance fields
.field private mName:Ljava/lang/String;

.method public constructor <init>()V
    .registers 1
    invoke-direct {p0}, Landroid/app/Activity;-><init>()V
    return-void
.end method

.method protected writeSettings()V
    .registers 4
    .line 10
    const-string v1, "settings.dat"
    const/4 v2, 0x1
    invoke-virtual {p0, v1, v2}, Landroid/content/Context;->openFileOutput(Ljava/lang/String;I)Ljava/io/FileOutputStream;
    move-result-object v0
    return-void
.end method
"#;

const HELPER: &str = r#".class public Lcom/example/Helper;
.super Ljava/lang/Object;
.implements Ljava/util/concurrent/Callable;

.method public call()Ljava/lang/Object;
    .registers 2
    const-string v0, "helper"
    return-object v0
.end method
"#;

fn indexed_store() -> Store {
	let store = Store::open_in_memory().unwrap();
	store.file_put("smali/com/example/MainActivity.smali", MAIN_ACTIVITY.as_bytes()).unwrap();
	store.file_put("smali/com/example/Helper.smali", HELPER.as_bytes()).unwrap();
	indexer::analyze_with_pacing(&store, false).unwrap();
	store
}

#[test]
fn op_identifiers_are_dense_and_monotonic() {
	let store = indexed_store();
	let count = store.op_count_ops().unwrap();

	assert!(count > 0);
	// Dense identifiers seeded at 1: every id in 1..=count resolves, and the set has no holes.
	for id in 1..=count {
		assert!(store.query().op_get(id).unwrap().is_some(), "missing op id {id}");
	}
	assert!(store.query().op_get(count + 1).unwrap().is_none());
}

#[test]
fn line_directives_are_dropped_at_index_time() {
	let store = indexed_store();
	let count = store.op_count_ops().unwrap();

	for id in 1..=count {
		let op = store.query().op_get(id).unwrap().unwrap();
		assert!(!(op.k == TokenKind::Directive && op.v == "line"));
	}
}

#[test]
fn method_ranges_nest_inside_their_class_range() {
	let store = indexed_store();
	let q = store.query();

	let methods = q.methods_in_class("", "").unwrap();
	assert_eq!(methods.len(), 3);

	for m in &methods {
		let method = q.method_of(m).unwrap().unwrap();
		let (class_first, class_last) = q.class_range_of(m.id).unwrap().unwrap();

		assert!(class_first <= method.first_op);
		assert!(method.first_op <= method.last_op);
		assert!(method.last_op <= class_last);
	}
}

#[test]
fn invocation_patterns_narrow_by_prefix_then_regex() {
	let store = indexed_store();
	let q = store.query();

	let sites = q
		.invocations(&InvocationPattern::new("invoke-virtual", r"Landroid/content/Context;->openFileOutput\(Ljava/lang/String;I\)").unwrap())
		.unwrap();
	assert_eq!(sites.len(), 1);
	assert_eq!(sites[0].v, "invoke-virtual");
	assert!(sites[0].target_value().starts_with("Landroid/content/Context;"));

	// The prefix alone is not enough; the regex must match the trailing parameter.
	let none = q
		.invocations(&InvocationPattern::new("invoke-virtual", r"Lcom/absent/Api;->nothing").unwrap())
		.unwrap();
	assert!(none.is_empty());
}

#[test]
fn consts_match_only_constant_ops() {
	let store = indexed_store();
	let q = store.query();

	let consts = q.consts(&InvocationPattern::new("const-string", "settings").unwrap()).unwrap();
	assert_eq!(consts.len(), 1);
	assert_eq!(consts[0].target_value(), "settings.dat");
}

#[test]
fn qualnames_resolve_for_ops_inside_methods_only() {
	let store = indexed_store();
	let q = store.query();

	let site = q
		.invocations(&InvocationPattern::new("invoke-virtual", "openFileOutput").unwrap())
		.unwrap()
		.remove(0);
	assert_eq!(
		q.qualname_of(&site).unwrap().unwrap(),
		"Lcom/example/MainActivity;->writeSettings()V"
	);

	// The `.class` head sits outside every method range.
	let class_op = q.class_of_method(&site).unwrap().unwrap();
	assert_eq!(q.qualname_of(&class_op).unwrap(), None);
	assert_eq!(q.class_name_of(&class_op), Some("Lcom/example/MainActivity;".to_string()));
}

#[test]
fn methods_in_class_filters_by_both_selectors() {
	let store = indexed_store();
	let q = store.query();

	let methods = q.methods_in_class("writeSettings", "MainActivity").unwrap();
	assert_eq!(methods.len(), 1);

	let none = q.methods_in_class("writeSettings", "Helper").unwrap();
	assert!(none.is_empty());
}

#[test]
fn matches_in_method_sees_heads_and_call_targets() {
	let store = indexed_store();
	let q = store.query();

	let method = q.methods_in_class("writeSettings", "MainActivity").unwrap().remove(0);

	// By head prefix.
	let consts = q.matches_in_method(&method, &InvocationPattern::new("const", "").unwrap()).unwrap();
	assert_eq!(consts.len(), 2);

	// By mention inside a call target.
	let calls = q.matches_in_method(&method, &InvocationPattern::new("openFileOutput", "").unwrap()).unwrap();
	assert_eq!(calls.len(), 1);
	assert_eq!(calls[0].v, "invoke-virtual");
}

#[test]
fn related_classes_match_superclasses_and_interfaces() {
	let store = indexed_store();
	let q = store.query();

	let related = q.related_classes(&regex::Regex::new("Activity|Callable").unwrap()).unwrap();
	assert_eq!(related.len(), 2);

	let related = q.related_classes(&regex::Regex::new("Callable").unwrap()).unwrap();
	assert_eq!(related.len(), 1);
	assert_eq!(q.class_name_of(&related[0]), Some("Lcom/example/Helper;".to_string()));
}

#[test]
fn file_enum_uses_like_globs() {
	let store = indexed_store();

	assert_eq!(store.query().file_enum("smali/%.smali").unwrap().len(), 2);
	assert_eq!(store.query().file_enum("smali/com/example/Main%.smali").unwrap().len(), 1);
	assert!(store.query().file_enum("root/assets/%.js").unwrap().is_empty());
}

#[test]
fn indexing_summary_matches_the_stored_totals() {
	let store = Store::open_in_memory().unwrap();
	store.file_put("smali/com/example/Helper.smali", HELPER.as_bytes()).unwrap();

	let summary = indexer::analyze_with_pacing(&store, false).unwrap();

	assert_eq!(summary.ops, store.op_count_ops().unwrap());
	assert_eq!(summary.classes, 1);
	assert_eq!(summary.methods, 1);
}
