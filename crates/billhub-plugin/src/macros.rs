//! Convenience macros for plugin development.

/// Builds a [`PluginMetadata`](crate::metadata::PluginMetadata).
///
/// # Example
/// ```rust,ignore
/// let meta = plugin_metadata!(
///     name: "billing-extras",
///     version: "1.0.0",
///     description: "Proration helpers",
///     author: "BillHub Team",
///     dependencies: { "ledger" => "^2" },
///     keywords: ["proration", "billing"]
/// );
/// ```
#[macro_export]
macro_rules! plugin_metadata {
    (
        name: $name:expr,
        version: $version:expr
        $(, description: $desc:expr)?
        $(, author: $author:expr)?
        $(, dependencies: { $($dep:expr => $range:expr),* $(,)? })?
        $(, keywords: [ $($kw:expr),* $(,)? ])?
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut meta = $crate::metadata::PluginMetadata::new($name, $version);
        $( meta = meta.with_description($desc); )?
        $( meta = meta.with_author($author); )?
        $( $( meta = meta.with_dependency($dep, $range); )* )?
        $( $( meta = meta.with_keyword($kw); )* )?
        meta
    }};
}

/// Builds a [`HookPayload`](crate::hooks::definitions::HookPayload).
///
/// # Example
/// ```rust,ignore
/// let payload = hook_payload!(names::INVOICE_PAID, {
///     "invoice_id" => "inv_42",
///     "amount_cents" => 1999,
/// });
/// ```
#[macro_export]
macro_rules! hook_payload {
    ($hook:expr) => {
        $crate::hooks::definitions::HookPayload::empty($hook)
    };
    ($hook:expr, { $($key:expr => $value:expr),* $(,)? }) => {{
        let payload = $crate::hooks::definitions::HookPayload::empty($hook);
        $(
            let payload = payload.with_data($key, $value);
        )*
        payload
    }};
}
