//! Shared compression dictionaries keyed by ecosystem.
//!
//! Dictionaries are raw content: frequent tokens of a language or format that
//! prime the codec's match window. A chunk records the dictionary id so the
//! same bytes can be located again on decode.

use std::collections::HashMap;
use std::sync::Arc;

const JAVASCRIPT: &str = r#"import { } from ''; export default function const let var return async await
=> { } require('') module.exports = undefined null true false this.props.state console.log(
JSON.stringify(JSON.parse( Promise.resolve( new Error(' typeof === !== .then(.catch(.map(.filter(
.forEach(.reduce( Object.keys( Array.isArray( document.getElementById( addEventListener('click',
"dependencies": { "devDependencies": { "scripts": { "name": "version": "main": "type": "module"
interface type extends implements readonly string number boolean Record<string, Partial< "#;

const PYTHON: &str = r#"import from def class self return None True False if __name__ == '__main__':
    def __init__(self, ): super().__init__() print(f" raise ValueError( except Exception as e:
with open( as f: for in range(len( elif else: try: finally: lambda yield async def await
@property @staticmethod @classmethod isinstance( dict[str, list[ Optional[ typing import
logging.getLogger(__name__) logger.info( np.array( pd.DataFrame( requirements.txt setup.py "#;

const RUST: &str = r#"use std:: pub fn pub struct pub enum impl for mod crate:: super:: self
let mut match Some( None Ok( Err( Result<, String> Option< Vec<u8> &str &mut Box<dyn Arc<
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)] #[cfg(test)] mod tests {
#[test] fn assert_eq!( assert!( println!(" format!(" .unwrap() .iter().map(|x| .collect::<
.map_err(|e| ?; where T: Send + Sync + 'static async fn .await tokio:: serde:: [dependencies]"#;

const GO: &str = r#"package main import ( "fmt" "context" "errors" ) func (s *Server) err != nil {
return nil, err } if err := ; err != nil { type struct { interface { map[string] []byte
fmt.Sprintf(" fmt.Errorf(" ctx context.Context defer go func() { chan select { case <-
json:"" yaml:"" := range for _, v := make([] append( len( nil go.mod go.sum require "#;

const JAVA: &str = r#"package import java.util. public class private static final void return
new ArrayList<>() List<String> Map<String, @Override public String toString() { this.
throws Exception try { } catch ( e) { } finally { System.out.println( extends implements
@Autowired @Service @RestController @GetMapping(" Optional<> stream().map( .collect(Collectors."#;

const WEB: &str = r#"<!DOCTYPE html><html lang="en"><head><meta charset="utf-8"><title></title>
<link rel="stylesheet" href=""><script src=""></script></head><body><div class=""><span>
</span></div><a href=""></a><img src="" alt=""><p></p><ul><li></li></ul></body></html>
{"id":"name":"type":"value":"data":"items":[{"created_at":"updated_at":"status":"error":null}]
display: flex; margin: 0 auto; padding: color: background-color: font-size: px; width: 100%;"#;

/// Registry of dictionaries available to the balanced strategy.
#[derive(Debug, Default)]
pub struct DictionaryRegistry {
    /// ecosystem → dictionary id
    ecosystems: HashMap<String, String>,
    /// dictionary id → bytes
    dictionaries: HashMap<String, Arc<[u8]>>,
}

impl DictionaryRegistry {
    /// Registry with no dictionaries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in ecosystem dictionaries.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for (ecosystem, content) in [
            ("javascript", JAVASCRIPT),
            ("python", PYTHON),
            ("rust", RUST),
            ("go", GO),
            ("java", JAVA),
            ("web", WEB),
        ] {
            registry.register(ecosystem, content.as_bytes().to_vec());
        }
        registry
    }

    /// Register (or replace) the dictionary for an ecosystem. Returns its id.
    pub fn register(&mut self, ecosystem: &str, content: Vec<u8>) -> String {
        let ecosystem = canonical_ecosystem(ecosystem);
        let id = format!("{}-v1", ecosystem);
        self.dictionaries.insert(id.clone(), Arc::from(content));
        self.ecosystems.insert(ecosystem, id.clone());
        id
    }

    /// Dictionary id and bytes for an ecosystem hint.
    pub fn resolve(&self, ecosystem: &str) -> Option<(&str, &[u8])> {
        let id = self.ecosystems.get(&canonical_ecosystem(ecosystem))?;
        let bytes = self.dictionaries.get(id)?;
        Some((id.as_str(), bytes.as_ref()))
    }

    /// Dictionary bytes by id.
    pub fn get(&self, id: &str) -> Option<&[u8]> {
        self.dictionaries.get(id).map(|bytes| bytes.as_ref())
    }

    pub fn len(&self) -> usize {
        self.dictionaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dictionaries.is_empty()
    }
}

fn canonical_ecosystem(ecosystem: &str) -> String {
    let lower = ecosystem.trim().to_ascii_lowercase();
    match lower.as_str() {
        "js" | "node" | "nodejs" | "typescript" | "ts" | "npm" => "javascript".to_string(),
        "py" | "pip" => "python".to_string(),
        "cargo" | "rs" => "rust".to_string(),
        "golang" => "go".to_string(),
        "jvm" | "kotlin" | "maven" | "gradle" => "java".to_string(),
        "html" | "css" | "json" => "web".to_string(),
        _ => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_resolve_with_aliases() {
        let registry = DictionaryRegistry::with_builtins();
        assert_eq!(registry.len(), 6);

        let (id, bytes) = registry.resolve("TypeScript").unwrap();
        assert_eq!(id, "javascript-v1");
        assert!(!bytes.is_empty());
        assert_eq!(registry.get("javascript-v1"), Some(bytes));
        assert!(registry.resolve("cobol").is_none());
    }

    #[test]
    fn test_register_custom_dictionary() {
        let mut registry = DictionaryRegistry::empty();
        assert!(registry.is_empty());

        let id = registry.register("Elixir", b"defmodule def do end |> %{}".to_vec());
        assert_eq!(id, "elixir-v1");
        assert_eq!(registry.resolve("elixir").map(|(id, _)| id), Some("elixir-v1"));
    }
}
