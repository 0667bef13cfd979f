use serde::Serialize;

#[derive(Serialize)]
pub struct FolderQuery<'a> {
    pub folder: &'a str,
}

#[derive(Serialize)]
pub struct CompletionQuery<'a> {
    pub folder: &'a str,
    pub device: &'a str,
}

#[derive(Serialize)]
pub struct EventsQuery {
    pub since: i64,
    pub limit: u32,
}

#[derive(Serialize)]
pub struct DevicePauseQuery<'a> {
    pub device: &'a str,
    pub pause: bool,
}
