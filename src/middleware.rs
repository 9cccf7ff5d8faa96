use crate::frame::Frame;
use crate::http::{HttpRequest, HttpResponse};
use crate::session::ClientSession;

pub enum HttpHandlerStatus {
    DynamicResponse(HttpResponse),
    DefaultResponse,
    DisconnectClient,
}

pub enum WsHandlerStatus {
    Processed,
    Ignore,
}

type HttpHandler = Box<dyn FnMut(&HttpRequest) -> HttpHandlerStatus + Send>;
type HttpPostProcessor = Box<dyn FnMut(&HttpRequest, &mut HttpResponse) + Send>;
type WsHandler = Box<dyn FnMut(&mut ClientSession, &Frame) -> WsHandlerStatus + Send>;

struct RoutePredicate {
    routes: Vec<String>,
    case_sensitive: bool,
}

impl RoutePredicate {
    fn matches(&self, candidate: &str) -> bool {
        if self.case_sensitive {
            self.routes.iter().any(|r| r == candidate)
        } else {
            self.routes.iter().any(|r| r.eq_ignore_ascii_case(candidate))
        }
    }
}

/// The three ordered handler chains that make up the dispatch surface of a
/// `Server`. Registration order is dispatch order; the first handler to
/// short-circuit (an HTTP handler returning anything but `default-response`,
/// or a WebSocket handler returning `processed`) stops the chain.
#[derive(Default)]
pub struct MiddlewareRegistry {
    http_handlers: Vec<(Option<RoutePredicate>, HttpHandler)>,
    http_postprocessors: Vec<(Option<RoutePredicate>, HttpPostProcessor)>,
    ws_handlers: Vec<(Option<RoutePredicate>, WsHandler)>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        MiddlewareRegistry::default()
    }

    pub fn add_http_handler(
        &mut self,
        handler: impl FnMut(&HttpRequest) -> HttpHandlerStatus + Send + 'static,
    ) {
        self.http_handlers.push((None, Box::new(handler)));
    }

    pub fn add_route_http_handler(
        &mut self,
        routes: Vec<String>,
        case_sensitive: bool,
        handler: impl FnMut(&HttpRequest) -> HttpHandlerStatus + Send + 'static,
    ) {
        self.http_handlers.push((
            Some(RoutePredicate { routes, case_sensitive }),
            Box::new(handler),
        ));
    }

    pub fn add_post_processor(
        &mut self,
        processor: impl FnMut(&HttpRequest, &mut HttpResponse) + Send + 'static,
    ) {
        self.http_postprocessors.push((None, Box::new(processor)));
    }

    pub fn add_route_post_processor(
        &mut self,
        routes: Vec<String>,
        case_sensitive: bool,
        processor: impl FnMut(&HttpRequest, &mut HttpResponse) + Send + 'static,
    ) {
        self.http_postprocessors.push((
            Some(RoutePredicate { routes, case_sensitive }),
            Box::new(processor),
        ));
    }

    pub fn add_ws_handler(
        &mut self,
        handler: impl FnMut(&mut ClientSession, &Frame) -> WsHandlerStatus + Send + 'static,
    ) {
        self.ws_handlers.push((None, Box::new(handler)));
    }

    pub fn add_route_ws_handler(
        &mut self,
        routes: Vec<String>,
        case_sensitive: bool,
        handler: impl FnMut(&mut ClientSession, &Frame) -> WsHandlerStatus + Send + 'static,
    ) {
        self.ws_handlers.push((
            Some(RoutePredicate { routes, case_sensitive }),
            Box::new(handler),
        ));
    }

    pub(crate) fn dispatch_http(&mut self, request: &HttpRequest) -> HttpHandlerStatus {
        for (predicate, handler) in self.http_handlers.iter_mut() {
            if let Some(predicate) = predicate {
                if !predicate.matches(&request.resource) {
                    continue;
                }
            }
            match handler(request) {
                HttpHandlerStatus::DefaultResponse => continue,
                other => return other,
            }
        }
        HttpHandlerStatus::DefaultResponse
    }

    pub(crate) fn run_postprocessors(&mut self, request: &HttpRequest, response: &mut HttpResponse) {
        for (predicate, processor) in self.http_postprocessors.iter_mut() {
            if let Some(predicate) = predicate {
                if !predicate.matches(&request.resource) {
                    continue;
                }
            }
            processor(request, response);
        }
    }

    /// First handler that both matches the session's bound resource (when
    /// route-scoped) and returns `Processed` stops the chain. A
    /// route-scoped handler that doesn't match simply defers, same as an
    /// unscoped handler that returns `Ignore` -- the original reference
    /// implementation's route-scoped WebSocket wrapper discarded the
    /// user callback's return value entirely; this propagates it, since
    /// short-circuiting route-matched handlers is required for the
    /// dispatch algorithm in the spec to mean anything.
    pub(crate) fn dispatch_ws(&mut self, session: &mut ClientSession, frame: &Frame) -> WsHandlerStatus {
        let resource = session.ws_resource.clone().unwrap_or_default();
        for (predicate, handler) in self.ws_handlers.iter_mut() {
            if let Some(predicate) = predicate {
                if !predicate.matches(&resource) {
                    continue;
                }
            }
            match handler(session, frame) {
                WsHandlerStatus::Ignore => continue,
                WsHandlerStatus::Processed => return WsHandlerStatus::Processed,
            }
        }
        WsHandlerStatus::Ignore
    }
}
