//! Decompiled source text and its cache.
//!
//! Text generation is delegated to [`Decompiler`] implementations. The crate ships one,
//! [`IlDisassembler`], which renders IL assembly text from the decoded method bodies. A
//! decompiler producing C# can be registered by the embedding process; without one, C# requests
//! fail with [`crate::Error::NotSupported`].
//!
//! ```rust,no_run
//! use dotlens::{source::DecompileFormat, Analyzer};
//!
//! let analyzer = Analyzer::new();
//! analyzer.load("tests/samples/Sample.dll".as_ref(), &[])?;
//! let source = analyzer.decompile("T:Sample.SimpleClass", DecompileFormat::Il)?;
//! println!("{}", source.text);
//! # Ok::<(), dotlens::Error>(())
//! ```

use std::{
    fmt::Write,
    sync::{Arc, RwLock},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cache::{CacheKind, GenerationCache},
    context::BinaryContext,
    disassembler::render_instruction,
    identity::MemberId,
    metadata::{
        symbols::{Assembly, EventDef, FieldDef, MethodDef, PropertyDef, TypeDef},
        token::Token,
    },
    resolver::MemberResolver,
    summary::Symbol,
    usage::instructions,
    Error::NotSupported,
    Result,
};

/// Output language of a decompilation
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DecompileFormat {
    /// C# source
    #[strum(to_string = "csharp", serialize = "c#")]
    #[serde(rename = "csharp")]
    CSharp,
    /// IL assembly text
    Il,
}

/// Turns a symbol into source text
pub trait Decompiler: Send + Sync {
    /// Name reported alongside the produced text
    fn name(&self) -> &str;

    /// Whether this decompiler can produce `format`
    fn supports(&self, format: DecompileFormat) -> bool;

    /// Renders `symbol` of `assembly` in `format`.
    ///
    /// # Errors
    /// Implementations report symbols or formats they cannot handle as
    /// [`crate::Error::NotSupported`].
    fn decompile(
        &self,
        assembly: &Assembly,
        symbol: &Symbol,
        format: DecompileFormat,
    ) -> Result<String>;
}

/// The built-in IL assembly text renderer
#[derive(Debug, Default, Clone, Copy)]
pub struct IlDisassembler;

impl IlDisassembler {
    fn method_header(assembly: &Assembly, method: &MethodDef) -> String {
        let mut header = format!(".method {}", method.accessibility());
        for (set, keyword) in [
            (method.is_static(), "static"),
            (method.is_new_slot(), "newslot"),
            (method.is_abstract(), "abstract"),
            (method.is_virtual(), "virtual"),
        ] {
            if set {
                header.push(' ');
                header.push_str(keyword);
            }
        }

        let render = |token: Token| assembly.type_name(token);
        let params: Vec<String> = method
            .signature
            .params
            .iter()
            .enumerate()
            .map(|(index, param)| match method.param_names.get(index) {
                Some(name) if !name.is_empty() => format!("{} {name}", param.render(&render)),
                _ => param.render(&render),
            })
            .collect();
        let generics = if method.generic_params.is_empty() {
            String::new()
        } else {
            format!("<{}>", method.generic_params.join(", "))
        };

        format!(
            "{header} {} {}{generics}({})",
            method.signature.return_type.render(&render),
            method.name,
            params.join(", ")
        )
    }

    fn write_method(out: &mut String, assembly: &Assembly, method: &MethodDef, indent: &str) {
        let _ = writeln!(out, "{indent}{}", Self::method_header(assembly, method));
        let _ = writeln!(out, "{indent}{{");
        if let Some(body) = &method.body {
            let _ = writeln!(out, "{indent}  // code size {}", body.len());
            if assembly.entry_point == Some(method.token) {
                let _ = writeln!(out, "{indent}  .entrypoint");
            }
            match instructions(method) {
                Some(decoded) => {
                    for instruction in &decoded {
                        let _ = writeln!(
                            out,
                            "{indent}  {}",
                            render_instruction(assembly, instruction)
                        );
                    }
                }
                None => {
                    let _ = writeln!(out, "{indent}  // malformed method body");
                }
            }
        }
        let _ = writeln!(out, "{indent}}}");
    }

    fn field_line(assembly: &Assembly, field: &FieldDef) -> String {
        let mut line = format!(".field {}", field.accessibility());
        if field.is_static() {
            line.push_str(" static");
        }
        if field.is_literal() {
            line.push_str(" literal");
        }
        format!("{line} {} {}", assembly.render_type(&field.signature), field.name)
    }

    fn write_property(out: &mut String, assembly: &Assembly, property: &PropertyDef, indent: &str) {
        let _ = writeln!(
            out,
            "{indent}.property {} {}",
            assembly.render_type(&property.signature.base),
            property.name
        );
        let _ = writeln!(out, "{indent}{{");
        for (directive, accessor) in [(".get", property.getter), (".set", property.setter)] {
            if let Some(accessor) = accessor.and_then(|token| assembly.method(token)) {
                let _ = writeln!(
                    out,
                    "{indent}  {directive} {}",
                    assembly.method_signature_text(accessor)
                );
            }
        }
        let _ = writeln!(out, "{indent}}}");
    }

    fn write_event(out: &mut String, assembly: &Assembly, event: &EventDef, indent: &str) {
        let handler = event
            .event_type
            .map_or_else(String::new, |token| format!("{} ", assembly.type_name(token)));
        let _ = writeln!(out, "{indent}.event {handler}{}", event.name);
        let _ = writeln!(out, "{indent}{{");
        for (directive, accessor) in [
            (".addon", event.add),
            (".removeon", event.remove),
            (".fire", event.raise),
        ] {
            if let Some(accessor) = accessor.and_then(|token| assembly.method(token)) {
                let _ = writeln!(
                    out,
                    "{indent}  {directive} {}",
                    assembly.method_signature_text(accessor)
                );
            }
        }
        let _ = writeln!(out, "{indent}}}");
    }

    fn write_type(out: &mut String, assembly: &Assembly, type_def: &TypeDef, indent: &str) {
        let mut header = format!(".class {}", type_def.accessibility());
        for (set, keyword) in [
            (type_def.is_interface(), "interface"),
            (type_def.is_abstract(), "abstract"),
            (type_def.is_sealed(), "sealed"),
        ] {
            if set {
                header.push(' ');
                header.push_str(keyword);
            }
        }
        let _ = writeln!(out, "{indent}{header} {}", type_def.full_name);
        if let Some(base) = type_def.base {
            let _ = writeln!(out, "{indent}  extends {}", assembly.type_name(base));
        }
        if !type_def.interfaces.is_empty() {
            let interfaces: Vec<String> = type_def
                .interfaces
                .iter()
                .map(|token| assembly.type_name(*token))
                .collect();
            let _ = writeln!(out, "{indent}  implements {}", interfaces.join(", "));
        }
        let _ = writeln!(out, "{indent}{{");

        let inner = format!("{indent}  ");
        for field in type_def.fields.iter().filter_map(|token| assembly.field(*token)) {
            let _ = writeln!(out, "{inner}{}", Self::field_line(assembly, field));
        }
        for method in type_def.methods.iter().filter_map(|token| assembly.method(*token)) {
            Self::write_method(out, assembly, method, &inner);
        }
        for property in type_def
            .properties
            .iter()
            .filter_map(|token| assembly.property(*token))
        {
            Self::write_property(out, assembly, property, &inner);
        }
        for event in type_def.events.iter().filter_map(|token| assembly.event(*token)) {
            Self::write_event(out, assembly, event, &inner);
        }
        for nested in type_def
            .nested_types
            .iter()
            .filter_map(|token| assembly.type_def(*token))
        {
            Self::write_type(out, assembly, nested, &inner);
        }

        let _ = writeln!(out, "{indent}}}");
    }
}

impl Decompiler for IlDisassembler {
    fn name(&self) -> &str {
        "il"
    }

    fn supports(&self, format: DecompileFormat) -> bool {
        format == DecompileFormat::Il
    }

    fn decompile(
        &self,
        assembly: &Assembly,
        symbol: &Symbol,
        format: DecompileFormat,
    ) -> Result<String> {
        if !self.supports(format) {
            return Err(NotSupported(format!("{} cannot produce {format}", self.name())));
        }

        let mut out = String::new();
        match symbol {
            Symbol::Type(type_def) => Self::write_type(&mut out, assembly, type_def, ""),
            Symbol::Method(method) => Self::write_method(&mut out, assembly, method, ""),
            Symbol::Field(field) => {
                let _ = writeln!(out, "{}", Self::field_line(assembly, field));
            }
            Symbol::Property(property) => Self::write_property(&mut out, assembly, property, ""),
            Symbol::Event(event) => Self::write_event(&mut out, assembly, event, ""),
        }
        Ok(out)
    }
}

/// Text produced for one symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecompiledSource {
    /// The decompiled symbol
    pub id: MemberId,
    /// Output language
    pub format: DecompileFormat,
    /// Name of the decompiler that produced the text
    pub decompiler: String,
    /// The text
    pub text: String,
    /// Served from the source cache
    pub cached: bool,
}

#[derive(Debug, Clone)]
struct Rendered {
    decompiler: String,
    text: Arc<str>,
}

/// Identifier to source text cache in front of the registered decompilers
pub struct SourceCache {
    context: Arc<BinaryContext>,
    resolver: Arc<MemberResolver>,
    decompilers: RwLock<Vec<Arc<dyn Decompiler>>>,
    cache: Arc<GenerationCache<(Token, DecompileFormat), Rendered>>,
}

impl SourceCache {
    /// Creates the cache with the built-in [`IlDisassembler`] and registers it with `context`
    #[must_use]
    pub fn new(context: Arc<BinaryContext>, resolver: Arc<MemberResolver>) -> Self {
        let cache = Arc::new(GenerationCache::new(CacheKind::Source, "source"));
        context.register_cache(cache.clone());

        SourceCache {
            context,
            resolver,
            decompilers: RwLock::new(vec![Arc::new(IlDisassembler)]),
            cache,
        }
    }

    /// Adds a decompiler. Later registrations take precedence for the formats they support.
    pub fn register(&self, decompiler: Arc<dyn Decompiler>) {
        debug!(decompiler = decompiler.name(), "registered decompiler");
        write_lock!(self.decompilers).push(decompiler);
    }

    fn decompiler_for(&self, format: DecompileFormat) -> Result<Arc<dyn Decompiler>> {
        read_lock!(self.decompilers)
            .iter()
            .rev()
            .find(|decompiler| decompiler.supports(format))
            .cloned()
            .ok_or_else(|| NotSupported(format!("no decompiler registered for {format}")))
    }

    /// Text of `target` in `format`, from the cache when available.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotFound`] if `target` does not resolve,
    /// [`crate::Error::NotSupported`] if no decompiler supports `format`,
    /// [`crate::Error::InvalidOperation`] if nothing is loaded, and whatever the decompiler
    /// reports.
    pub fn decompile(&self, target: &str, format: DecompileFormat) -> Result<DecompiledSource> {
        let snapshot = self.context.snapshot()?;
        let assembly = &snapshot.assembly;
        let symbol = self.resolver.require_in(&snapshot, target)?;
        let id = symbol.id(assembly.mvid);
        let key = (symbol.token(), format);

        if let Some(rendered) = self.cache.get(&key, snapshot.generation) {
            return Ok(DecompiledSource {
                id,
                format,
                decompiler: rendered.decompiler,
                text: rendered.text.to_string(),
                cached: true,
            });
        }

        let decompiler = self.decompiler_for(format)?;
        let text = decompiler.decompile(assembly, &symbol, format)?;
        debug!(%id, %format, decompiler = decompiler.name(), bytes = text.len(), "decompiled");
        self.cache.insert(
            key,
            snapshot.generation,
            Rendered {
                decompiler: decompiler.name().to_string(),
                text: Arc::from(text.as_str()),
            },
        );

        Ok(DecompiledSource {
            id,
            format,
            decompiler: decompiler.name().to_string(),
            text,
            cached: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{test::sample, Error};

    struct Stub {
        calls: AtomicUsize,
    }

    impl Decompiler for Stub {
        fn name(&self) -> &str {
            "stub"
        }

        fn supports(&self, format: DecompileFormat) -> bool {
            format == DecompileFormat::CSharp
        }

        fn decompile(
            &self,
            assembly: &Assembly,
            symbol: &Symbol,
            _format: DecompileFormat,
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("// {}", symbol.full_name(assembly)))
        }
    }

    fn cache() -> (crate::test::Sample, Arc<BinaryContext>, SourceCache) {
        let sample = sample();
        let context = Arc::new(BinaryContext::new());
        context.load_assembly(sample.assembly.clone()).unwrap();
        let resolver = Arc::new(MemberResolver::new(context.clone()));
        let cache = SourceCache::new(context.clone(), resolver);
        (sample, context, cache)
    }

    fn hex(token: Token) -> String {
        format!("0x{:08x}", token.value())
    }

    #[test]
    fn method_il() {
        let (sample, _, cache) = cache();
        let source = cache.decompile(&hex(sample.main), DecompileFormat::Il).unwrap();
        assert_eq!(source.decompiler, "il");
        assert!(!source.cached);

        let lines: Vec<&str> = source.text.lines().collect();
        assert_eq!(lines[0], ".method public static System.Void Main()");
        assert!(lines.contains(&"  .entrypoint"));
        assert!(lines.contains(&"  IL_000f: ldstr \"Hello, \\\"world\\\"\""));
        assert_eq!(lines.last(), Some(&"}"));
    }

    #[test]
    fn type_listing() {
        let (sample, _, cache) = cache();
        let source = cache.decompile(&hex(sample.simple), DecompileFormat::Il).unwrap();
        let text = source.text;

        assert!(text.starts_with(".class public Sample.SimpleClass\n  extends System.Object\n{"));
        assert!(text.contains("  .field private System.Int32 counter\n"));
        assert!(text.contains("  .method public System.Void Add(System.Int32 value)\n"));
        assert!(text.contains("  .property System.Int32 Count\n"));
        assert!(text.contains("    .get System.Int32 get_Count()\n"));

        let animal = cache.decompile("T:Sample.Animals.Animal", DecompileFormat::Il).unwrap();
        assert!(animal.text.contains("implements Sample.Animals.IDescribable"));
        assert!(animal
            .text
            .contains(".method public newslot abstract virtual System.String Speak()"));
    }

    #[test]
    fn results_are_cached_per_generation() {
        let (sample, context, cache) = cache();
        let id = hex(sample.dog_speak);
        assert!(!cache.decompile(&id, DecompileFormat::Il).unwrap().cached);
        assert!(cache.decompile(&id, DecompileFormat::Il).unwrap().cached);

        context.load_assembly(sample.assembly.clone()).unwrap();
        assert!(!cache.decompile(&id, DecompileFormat::Il).unwrap().cached);
    }

    #[test]
    fn csharp_needs_a_registered_decompiler() {
        let (sample, _, cache) = cache();
        let id = hex(sample.reset);
        assert!(matches!(
            cache.decompile(&id, DecompileFormat::CSharp),
            Err(Error::NotSupported(_))
        ));

        let stub = Arc::new(Stub {
            calls: AtomicUsize::new(0),
        });
        cache.register(stub.clone());
        let source = cache.decompile(&id, DecompileFormat::CSharp).unwrap();
        assert_eq!(source.text, "// Sample.SimpleClass.Reset");
        assert_eq!(source.decompiler, "stub");
        cache.decompile(&id, DecompileFormat::CSharp).unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        assert!(matches!(
            cache.decompile("T:Sample.Missing", DecompileFormat::Il),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn format_names() {
        assert_eq!("csharp".parse::<DecompileFormat>().unwrap(), DecompileFormat::CSharp);
        assert_eq!("C#".parse::<DecompileFormat>().unwrap(), DecompileFormat::CSharp);
        assert_eq!("IL".parse::<DecompileFormat>().unwrap(), DecompileFormat::Il);
        assert_eq!(DecompileFormat::Il.to_string(), "il");
    }
}
