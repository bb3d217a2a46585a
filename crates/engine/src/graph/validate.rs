//! Structural validation of part definitions
//!
//! Checks that need nothing but the part itself and the configuration.
//! Every problem is reported; validation never stops at the first one.

use mortise_core::{CompositionConfig, CompositionError, PartDefinition, TypeShape};

/// Collect every structural problem of `part` into `errors`
pub(super) fn validate_part(
    part: &PartDefinition,
    config: &CompositionConfig,
    errors: &mut Vec<CompositionError>,
) {
    let arity = part.generic_arity();
    let invalid = |message: String| {
        CompositionError::invalid_configuration(vec![part.id().clone()], message)
    };

    if arity > 0 {
        let mut declared = Vec::new();
        part.id().shape().collect_params(&mut declared);
        if declared.len() != arity {
            errors.push(invalid(format!(
                "type parameters of {} must be numbered !0 through !{}",
                part.id(),
                arity - 1
            )));
        }
    }

    for export in part.exports() {
        let kind = export.member().kind();
        if !config.export_rule(kind, part.is_open_generic()).is_allowed() {
            let qualifier = if part.is_open_generic() { "open generic part " } else { "" };
            errors.push(invalid(format!(
                "{} on {}{} cannot be exported",
                export.member(),
                qualifier,
                part.id()
            )));
            continue;
        }
        if let Some(shape) = export.contract().shape() {
            check_slots(part, shape, &format!("export {}", export.contract()), errors);
            if arity > 0 && !binds_every_param(shape, arity) {
                errors.push(invalid(format!(
                    "export {} of {} does not determine every type parameter",
                    export.contract(),
                    part.id()
                )));
            }
        }
    }

    for import in part.imports() {
        if !import.member().kind().can_import() {
            errors.push(invalid(format!(
                "import {} on {} must be declared on a member",
                import.contract(),
                part.id()
            )));
        }
        if let Some(shape) = import.contract().shape() {
            check_slots(part, shape, &format!("import {}", import.contract()), errors);
        }
    }
}

/// Every slot referenced by `shape` must belong to `part`
fn check_slots(
    part: &PartDefinition,
    shape: &TypeShape,
    what: &str,
    errors: &mut Vec<CompositionError>,
) {
    if let Some(max) = shape.max_param() {
        if max >= part.generic_arity() {
            errors.push(CompositionError::invalid_configuration(
                vec![part.id().clone()],
                format!(
                    "{} on {} references type parameter !{} out of range",
                    what,
                    part.id(),
                    max
                ),
            ));
        }
    }
}

fn binds_every_param(shape: &TypeShape, arity: usize) -> bool {
    let mut params = Vec::new();
    shape.collect_params(&mut params);
    (0..arity).all(|i| params.contains(&i))
}
