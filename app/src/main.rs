use trellis::Application;
use std::process::ExitCode;

mod controllers;
mod middleware;
mod routes;

#[tokio::main]
async fn main() -> ExitCode {
    Application::new("demo")
        .controller("HomeController.health", controllers::home::health())
        .controller("UserController.index", controllers::user::index())
        .controller("UserController.show", controllers::user::show())
        .controller("UserController.store", controllers::user::store())
        .security("isLoggedIn", middleware::is_logged_in())
        .middleware(middleware::request_id())
        .routes(routes::routes())
        .run()
        .await
}
