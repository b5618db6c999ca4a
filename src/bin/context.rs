use std::error::Error;

use agents_quickstart::{
    Agent, AgentGraphBuilder, ChatCompletionsModel, RunConfig, RunContext, Runner, Settings,
    ToolOutcome, ToolSpec, init_logging,
};

#[derive(Debug)]
struct UserDetails {
    name: String,
    age: u32,
    password: u32,
}

fn user_tools() -> Vec<ToolSpec<UserDetails>> {
    vec![
        ToolSpec::new("get_name", "Fetch the name of the user").with_handler(
            |_args, ctx: RunContext<UserDetails>| async move {
                let user = ctx.context();
                Ok(ToolOutcome::Text(format!(
                    "The User name is {} and age is {}",
                    user.name, user.age
                )))
            },
        ),
        ToolSpec::new("get_age", "Fetch the age of the user").with_handler(
            |_args, ctx: RunContext<UserDetails>| async move {
                Ok(ToolOutcome::Text(format!(
                    "The User age is {}.",
                    ctx.context().age
                )))
            },
        ),
        ToolSpec::new("display_user_details", "Fetch the user details").with_handler(
            |_args, ctx: RunContext<UserDetails>| async move {
                let user = ctx.context();
                Ok(ToolOutcome::Text(format!(
                    "User name is {}, age is {}, and password is {}",
                    user.name, user.age, user.password
                )))
            },
        ),
    ]
}

fn main() -> Result<(), Box<dyn Error>> {
    let settings = Settings::load()?;
    init_logging(&settings.logging)?;
    let model = ChatCompletionsModel::new(settings.resolve_model()?)?;

    let mut graph = AgentGraphBuilder::<UserDetails>::new();
    let assistant = graph.add(
        Agent::builder("Personal Assistant")
            .instructions("You are a helpful personal assistant")
            .tools(user_tools()),
    );

    let runner = Runner::new(graph.build()?, model).with_config(RunConfig::from(&settings.run));
    let user = UserDetails {
        name: "Ubaid".to_string(),
        age: 17,
        password: 2468,
    };

    let result = runner.run_blocking(assistant, "What is age of user?", user)?;
    println!("{}", result.final_output);
    Ok(())
}
