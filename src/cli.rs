use crate::service::Route;

// Version from Cargo.toml
const DISPLAY_VERSION: &str = env!("CARGO_PKG_VERSION");

const HELP_TEXT: &str = "\
mealway - meal-planning assistant on a local language model\n\
\n\
Usage:\n\
    mealway [OPTIONS] <command>\n\
\n\
Commands:\n\
    meal-plan [--body <json>]           Plan breakfast, lunch and dinner.\n\
    recipe [--body <json>] [--save]     Write a recipe; --save stores it for `ask`.\n\
    shopping-list [--body <json>]       Build one shopping list for several dishes.\n\
    ask \"<question>\"                    Answer from previously saved recipes.\n\
    config                              Print the resolved configuration.\n\
\n\
Request bodies are JSON, read from --body or STDIN when piped:\n\
    meal-plan       {\"forbidden_products\": [], \"available_products\": [], \"target_calories\": \"medium\"}\n\
    recipe          {\"product\": \"omelette\", \"forbidden_products\": []}\n\
    shopping-list   {\"dishes\": [\"soup\"], \"forbidden_products\": []}\n\
\n\
Options:\n\
    -h, --help        Print this help text.\n\
    -v, --version     Show the version and this help output.\n\
    -d, --debug       Enable verbose logging to stderr.\n\
\n\
Environment variables (also read from .env):\n\
    MEALWAY_MODEL                    Model id or GGUF path (default: LiquidAI/LFM2-1.2B).\n\
                                     The candle backend only loads llama-family GGUF files;\n\
                                     point this at one, or use MEALWAY_BACKEND=ollama.\n\
    MEALWAY_BACKEND                  candle or ollama (default: candle).\n\
    MODEL_CACHE_DIR                  Model weights directory (default: ./models).\n\
    MEALWAY_HOST, MEALWAY_PORT       Bind address (default: 0.0.0.0:5000; ports below 80 use 5000).\n\
    MEALWAY_TEMPERATURE              Sampling temperature (default: 0.5).\n\
    MEALWAY_TOP_P                    Nucleus sampling (default: 0.9).\n\
    MEALWAY_MAX_NEW_TOKENS           Continuation budget (default: 1024).\n\
    MEALWAY_CONTEXT_WINDOW           Prompt plus continuation limit (default: 65536; candle caps it at 4096).\n\
    MEALWAY_SEED                     Fixed sampling seed (default: random).\n\
    MEALWAY_DEVICE                   cpu, cuda or metal (default: auto).\n\
    MEALWAY_RETRIEVAL                Enable the recipe store (default: false).\n\
    MEALWAY_STORE_DIR                Recipe store directory (default: ./recipe_store).\n\
    MEALWAY_EMBEDDING_MODEL          Embedder under the cache dir (default: sentence-transformers/all-MiniLM-L6-v2).\n\
    MEALWAY_REGENERATE_ON_MALFORMED  Retry once on unparsable output (default: false).\n\
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Generate {
        route: Route,
        body: Option<String>,
        save: bool,
    },
    Ask {
        question: String,
    },
    Config,
}

#[derive(Debug)]
pub struct CliConfig {
    pub command: Option<Command>,
    pub show_help: bool,
    pub show_version: bool,
    pub debug: bool,
}

impl CliConfig {
    pub fn from_env() -> Result<Self, String> {
        let args = std::env::args().skip(1);
        Self::from_args(args)
    }

    pub fn from_args<I>(args: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut show_help = false;
        let mut show_version = false;
        let mut debug = false;
        let mut command_tokens: Vec<String> = Vec::new();

        let mut iter = args.into_iter();

        while let Some(argument) = iter.next() {
            match argument.as_str() {
                "--help" | "-h" => {
                    show_help = true;
                }
                "--version" | "-v" => {
                    show_version = true;
                    show_help = true;
                }
                "--debug" | "-d" => {
                    debug = true;
                }
                _ => {
                    command_tokens.push(argument);
                    command_tokens.extend(iter);
                    break;
                }
            }
        }

        let command = if command_tokens.is_empty() {
            None
        } else {
            Some(parse_command(&command_tokens)?)
        };

        Ok(Self {
            command,
            show_help,
            show_version,
            debug,
        })
    }
}

fn parse_command(tokens: &[String]) -> Result<Command, String> {
    let kind = tokens[0].to_lowercase();

    match kind.as_str() {
        "meal-plan" | "recipe" | "shopping-list" => {
            let route: Route = kind.parse()?;
            parse_generate_command(route, &tokens[1..])
        }
        "ask" => {
            if tokens.len() < 2 {
                return Err("ask requires a question.".to_string());
            }

            let question = tokens[1..].join(" ");
            if question.trim().is_empty() {
                return Err("ask requires a non-empty question.".to_string());
            }

            Ok(Command::Ask { question })
        }
        "config" => {
            if tokens.len() > 1 {
                return Err(format!("unexpected argument after `config`: {}", tokens[1]));
            }

            Ok(Command::Config)
        }
        _ => Err(format!(
            "unknown command: {}. Run `mealway --help` for usage.",
            tokens[0]
        )),
    }
}

fn parse_generate_command(route: Route, tokens: &[String]) -> Result<Command, String> {
    let name = route_command_name(route);
    let mut body: Option<String> = None;
    let mut save = false;
    let mut i = 0;

    while i < tokens.len() {
        match tokens[i].as_str() {
            "--body" => {
                if body.is_some() {
                    return Err(format!("`{name}` accepts --body only once"));
                }

                let value = tokens
                    .get(i + 1)
                    .ok_or_else(|| format!("`{name} --body` requires a JSON value"))?;
                body = Some(value.clone());
                i += 2;
            }
            "--save" if route == Route::Recipe => {
                save = true;
                i += 1;
            }
            other => {
                return Err(format!("unexpected argument after `{name}`: {other}"));
            }
        }
    }

    Ok(Command::Generate { route, body, save })
}

fn route_command_name(route: Route) -> &'static str {
    match route {
        Route::MealPlan => "meal-plan",
        Route::Recipe => "recipe",
        Route::ShoppingList => "shopping-list",
    }
}

pub fn print_help() {
    println!("{HELP_TEXT}");
}

pub fn print_version() {
    println!("mealway {DISPLAY_VERSION}");
}
