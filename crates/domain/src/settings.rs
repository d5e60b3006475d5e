/// Resolves one setting: call-site override, then instance override, then default.
///
/// Absence is expressed with `None`, never with a zero value, so an explicit
/// override always wins over the layers below it.
pub fn resolve_setting<T>(per_call: Option<T>, instance: Option<T>, default: T) -> T {
    per_call.or(instance).unwrap_or(default)
}
